//! Per-device connection pool.
//!
//! Every connection in use holds one permit of a fair semaphore sized by the
//! pool configuration, so a device never sees more than `size` open
//! connections and callers waiting for one are served in arrival order.
//! Connections are dialed lazily and reused once released cleanly.
//!
//! An **exclusive** lease takes sole custody of a connection (event streams).
//! A **shared** lease takes a free connection when one is available without
//! waiting, and otherwise joins a connection already in shared use, picked
//! round-robin. It never joins while other callers are queued for a permit,
//! so a queued exclusive lease is not overtaken by later shared ones. I/O on a lease locks the underlying transport, so writes from
//! different shared holders never interleave.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use homelink_domain::device::PoolConfig;
use homelink_domain::error::HubError;

use crate::ports::transport::{Dialer, Transport};

type SharedTransport = Arc<tokio::sync::Mutex<Box<dyn Transport>>>;

/// Pool-local identifier of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Point-in-time counters, mostly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections currently open (idle or in use).
    pub open: usize,
    /// Connections with at least one holder.
    pub in_use: usize,
}

struct Entry {
    id: ConnectionId,
    conn: SharedTransport,
    holders: usize,
    exclusive: bool,
    /// Released with an error; handed out no more and dropped once the last
    /// holder checks in.
    poisoned: bool,
    /// Held while `holders > 0`.
    permit: Option<OwnedSemaphorePermit>,
}

#[derive(Default)]
struct PoolState {
    entries: Vec<Entry>,
    next_id: u64,
    cursor: usize,
    closed: bool,
    /// Callers parked on the semaphore.
    waiters: usize,
}

struct PoolInner {
    config: PoolConfig,
    dialer: Arc<dyn Dialer>,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

/// Bounded set of connections to one device. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool; connections are dialed on first lease.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the configured size is zero.
    pub fn new(config: PoolConfig, dialer: Arc<dyn Dialer>) -> Result<Self, HubError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(config.size)),
                config,
                dialer,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Lease a connection, waiting at most `timeout`.
    ///
    /// Waiting only ever blocks the calling task; pools of other devices are
    /// unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Timeout`] when no connection could be handed out
    /// (or dialed) in time, the dialer's error when opening a connection
    /// fails, or a transport error once the pool is closed.
    pub async fn lease(&self, timeout: Duration, exclusive: bool) -> Result<Lease, HubError> {
        let deadline = Instant::now() + timeout;

        if !exclusive {
            match Arc::clone(&self.inner.permits).try_acquire_owned() {
                Ok(permit) => return self.check_out(permit, false, deadline, timeout).await,
                Err(tokio::sync::TryAcquireError::Closed) => return Err(pool_closed()),
                Err(tokio::sync::TryAcquireError::NoPermits) => {
                    if let Some(lease) = self.join_shared() {
                        return Ok(lease);
                    }
                }
            }
        }

        let queued = self.inner.enqueue();
        let acquired = tokio::time::timeout_at(
            deadline,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await;
        drop(queued);
        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(pool_closed()),
            Err(_) => {
                tracing::debug!(pool = %self.inner.config.name, ?timeout, exclusive, "lease timed out");
                return Err(HubError::Timeout(timeout));
            }
        };
        self.check_out(permit, exclusive, deadline, timeout).await
    }

    /// Return a lease. A `failure` marks the connection as poisoned: it is
    /// discarded instead of going back to the idle set.
    pub fn release(&self, lease: Lease, failure: Option<&HubError>) {
        debug_assert!(Arc::ptr_eq(&self.inner, &lease.pool));
        lease.release(failure);
    }

    /// Refuse further leases and drop idle connections. Outstanding leases
    /// stay valid; their connections are dropped when they come back.
    pub fn close(&self) {
        self.inner.permits.close();
        let mut state = self.inner.state();
        state.closed = true;
        state.entries.retain(|entry| entry.holders > 0);
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state();
        PoolStatus {
            open: state.entries.len(),
            in_use: state.entries.iter().filter(|e| e.holders > 0).count(),
        }
    }

    /// Hand out an idle connection, or dial a new one, under `permit`.
    async fn check_out(
        &self,
        permit: OwnedSemaphorePermit,
        exclusive: bool,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Lease, HubError> {
        let permit = match self.inner.take_idle(permit, exclusive) {
            Ok((id, conn)) => return Ok(self.lease_for(id, conn, exclusive)),
            Err(permit) => permit,
        };

        let transport = match tokio::time::timeout_at(deadline, self.inner.dialer.dial()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(pool = %self.inner.config.name, ?timeout, "dial timed out");
                return Err(HubError::Timeout(timeout));
            }
        };
        let (id, conn) = self.inner.insert(transport, exclusive, permit);
        tracing::debug!(pool = %self.inner.config.name, conn = %id, "connection opened");
        Ok(self.lease_for(id, conn, exclusive))
    }

    fn join_shared(&self) -> Option<Lease> {
        let mut state = self.inner.state();
        let len = state.entries.len();
        if len == 0 || state.waiters > 0 {
            return None;
        }
        let start = state.cursor % len;
        let picked = (0..len).map(|offset| (start + offset) % len).find(|&idx| {
            let entry = &state.entries[idx];
            entry.holders > 0 && !entry.exclusive && !entry.poisoned
        })?;
        state.cursor = picked + 1;
        let entry = &mut state.entries[picked];
        entry.holders += 1;
        let (id, conn) = (entry.id, Arc::clone(&entry.conn));
        drop(state);
        Some(self.lease_for(id, conn, false))
    }

    fn lease_for(&self, id: ConnectionId, conn: SharedTransport, exclusive: bool) -> Lease {
        Lease {
            pool: Arc::clone(&self.inner),
            id,
            conn,
            exclusive,
            failed: false,
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the caller as queued until the returned guard drops.
    fn enqueue(&self) -> Queued<'_> {
        self.state().waiters += 1;
        Queued(self)
    }

    /// Claim an idle connection under `permit`, rotating through the set.
    /// Hands the permit back when every connection is busy.
    fn take_idle(
        &self,
        permit: OwnedSemaphorePermit,
        exclusive: bool,
    ) -> Result<(ConnectionId, SharedTransport), OwnedSemaphorePermit> {
        let mut state = self.state();
        let len = state.entries.len();
        let start = if len == 0 { 0 } else { state.cursor % len };
        let Some(picked) = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| state.entries[idx].holders == 0)
        else {
            return Err(permit);
        };
        state.cursor = picked + 1;
        let entry = &mut state.entries[picked];
        entry.holders = 1;
        entry.exclusive = exclusive;
        entry.permit = Some(permit);
        Ok((entry.id, Arc::clone(&entry.conn)))
    }

    fn insert(
        &self,
        transport: Box<dyn Transport>,
        exclusive: bool,
        permit: OwnedSemaphorePermit,
    ) -> (ConnectionId, SharedTransport) {
        let mut state = self.state();
        // Never keep more than `size` connections around.
        while state.entries.len() >= self.config.size {
            let Some(idle) = state.entries.iter().position(|e| e.holders == 0) else {
                break;
            };
            state.entries.remove(idle);
        }
        let id = ConnectionId(state.next_id);
        state.next_id += 1;
        let conn: SharedTransport = Arc::new(tokio::sync::Mutex::new(transport));
        state.entries.push(Entry {
            id,
            conn: Arc::clone(&conn),
            holders: 1,
            exclusive,
            poisoned: false,
            permit: Some(permit),
        });
        (id, conn)
    }

    fn check_in(&self, id: ConnectionId, failed: bool) {
        let mut state = self.state();
        let closed = state.closed;
        let Some(pos) = state.entries.iter().position(|e| e.id == id) else {
            return;
        };
        let entry = &mut state.entries[pos];
        entry.holders = entry.holders.saturating_sub(1);
        entry.poisoned |= failed;
        if entry.holders > 0 {
            return;
        }
        if entry.poisoned || closed {
            let entry = state.entries.remove(pos);
            tracing::debug!(pool = %self.config.name, conn = %entry.id, "connection discarded");
            return;
        }
        entry.exclusive = false;
        entry.permit = None;
    }
}

/// A caller waiting for a permit.
struct Queued<'a>(&'a PoolInner);

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state();
        state.waiters = state.waiters.saturating_sub(1);
    }
}

fn pool_closed() -> HubError {
    HubError::Transport(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "connection pool closed",
    ))
}

/// Temporary custody of a pooled connection.
///
/// Dropping a lease returns the connection as healthy; use
/// [`release`](Self::release) to report a failure.
pub struct Lease {
    pool: Arc<PoolInner>,
    id: ConnectionId,
    conn: SharedTransport,
    exclusive: bool,
    failed: bool,
}

impl Lease {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Lock the underlying transport for a sequence of reads/writes.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Box<dyn Transport>> {
        self.conn.lock().await
    }

    /// Write and flush `bytes` as one uninterrupted unit.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] on I/O failure.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<(), HubError> {
        let mut transport = self.lock().await;
        transport.write_all(bytes).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Give the connection back, discarding it when `failure` is set.
    pub fn release(mut self, failure: Option<&HubError>) {
        if let Some(err) = failure {
            tracing::debug!(pool = %self.pool.config.name, conn = %self.id, %err, "releasing failed connection");
            self.failed = true;
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.check_in(self.id, self.failed);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("exclusive", &self.exclusive)
            .finish_non_exhaustive()
    }
}
