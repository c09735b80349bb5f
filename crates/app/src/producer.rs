//! Generic event producer over a pooled, line-oriented device stream.
//!
//! The producer holds an exclusive lease on one of the device's connections,
//! scans the byte stream for frames and hands each frame to a vendor
//! [`FrameDecoder`]. It reconnects with backoff whenever the lease cannot be
//! obtained or the stream ends.
//!
//! ```text
//! Stopped ──start──▶ Connecting ──lease──▶ Streaming
//!                        ▲                     │
//!                        └──── stream error ───┘
//! ```
//!
//! Stopping interrupts whichever await the task is parked on (lease wait,
//! backoff sleep, stream read).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use homelink_domain::device::Device;
use homelink_domain::error::HubError;
use homelink_domain::event::Event;

use crate::backoff::Backoff;
use crate::connection_pool::{ConnectionPool, Lease};
use crate::directory::{self, SharedDevice};
use crate::frame_scanner::{FrameScanner, ScannerConfig};
use crate::ports::event_bus::EventPublisher;
use crate::ports::extension::EventProducer;

/// Turns one protocol frame into a domain event.
pub trait FrameDecoder: Send + Sync {
    /// `Ok(None)` for frames that are recognized but carry nothing of
    /// interest; `Err` for frames that should have decoded but did not.
    fn decode(&self, frame: &[u8], device: &Device) -> Result<Option<Event>, HubError>;
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// How long to wait for the streaming connection.
    pub lease_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub scanner: ScannerConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(20),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            scanner: ScannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Stopped,
    Connecting,
    Streaming,
}

struct Shared {
    device: SharedDevice,
    pool: ConnectionPool,
    publisher: Arc<dyn EventPublisher>,
    decoder: Arc<dyn FrameDecoder>,
    config: ProducerConfig,
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct StreamProducer {
    name: String,
    shared: Arc<Shared>,
    state: Arc<watch::Sender<ProducerState>>,
    running: Mutex<Option<Running>>,
}

impl StreamProducer {
    pub fn new(
        name: impl Into<String>,
        device: SharedDevice,
        pool: ConnectionPool,
        publisher: Arc<dyn EventPublisher>,
        decoder: Arc<dyn FrameDecoder>,
        config: ProducerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ProducerState::Stopped);
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                device,
                pool,
                publisher,
                decoder,
                config,
            }),
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> ProducerState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventProducer for StreamProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.name.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.state),
            stop_rx,
        ));
        *running = Some(Running { stop, handle });
    }

    async fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };
        // The task may already be gone, in which case nobody listens.
        let _ = running.stop.send(true);
        if let Err(err) = running.handle.await {
            tracing::error!(producer = %self.name, %err, "producer task failed");
        }
        self.state.send_replace(ProducerState::Stopped);
    }
}

/// Sleep for `delay`. Returns `true` when stopped in the meantime.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = stop.changed() => true,
        () = tokio::time::sleep(delay) => false,
    }
}

async fn run(
    name: String,
    shared: Arc<Shared>,
    state: Arc<watch::Sender<ProducerState>>,
    mut stop: watch::Receiver<bool>,
) {
    let mut scanner = match FrameScanner::new(&shared.config.scanner) {
        Ok(scanner) => scanner,
        Err(err) => {
            tracing::error!(producer = %name, %err, "invalid scanner configuration");
            state.send_replace(ProducerState::Stopped);
            return;
        }
    };
    let device_id = directory::read(&shared.device).id;
    let mut backoff = Backoff::new(shared.config.backoff_initial, shared.config.backoff_max);

    while !*stop.borrow() {
        state.send_replace(ProducerState::Connecting);
        let leased = tokio::select! {
            biased;
            _ = stop.changed() => break,
            leased = shared.pool.lease(shared.config.lease_timeout, true) => leased,
        };
        let lease = match leased {
            Ok(lease) => lease,
            Err(err) => {
                let delay = backoff.next_delay();
                tracing::warn!(producer = %name, %err, attempt = backoff.attempt(), ?delay, "cannot lease stream connection");
                if sleep_or_stop(&mut stop, delay).await {
                    break;
                }
                continue;
            }
        };

        state.send_replace(ProducerState::Streaming);
        tracing::info!(producer = %name, conn = %lease.id(), "streaming");
        shared.publisher.enqueue(Event::DeviceProducingStarted { device_id });
        scanner.clear();

        match stream(&name, &shared, &lease, &mut scanner, &mut stop, &mut backoff).await {
            Ok(()) => {
                lease.release(None);
                break;
            }
            Err(err) => {
                lease.release(Some(&err));
                let delay = backoff.next_delay();
                tracing::warn!(producer = %name, %err, ?delay, "stream lost, reconnecting");
                if sleep_or_stop(&mut stop, delay).await {
                    break;
                }
            }
        }
    }

    state.send_replace(ProducerState::Stopped);
    tracing::info!(producer = %name, "stopped");
}

/// Read and publish frames until the stream fails (`Err`) or a stop is
/// requested (`Ok`).
async fn stream(
    name: &str,
    shared: &Shared,
    lease: &Lease,
    scanner: &mut FrameScanner,
    stop: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> Result<(), HubError> {
    let mut transport = lease.lock().await;
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.changed() => return Ok(()),
            frame = scanner.read_frame(&mut *transport) => frame?,
        };
        backoff.reset();

        let decoded = {
            let device = directory::read(&shared.device);
            shared.decoder.decode(&frame, &device)
        };
        match decoded {
            Ok(Some(event)) => shared.publisher.enqueue(event),
            Ok(None) => {}
            Err(err) => {
                let text = String::from_utf8_lossy(&frame);
                tracing::debug!(producer = %name, %err, frame = %text.trim_end(), "dropping frame");
            }
        }
    }
}
