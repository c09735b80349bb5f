//! Zone report consumer — answers report requests by querying the bridge.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use homelink_app::connection_pool::{ConnectionPool, Lease};
use homelink_app::directory::{self, SharedDevice};
use homelink_app::ports::extension::EventConsumer;
use homelink_domain::error::HubError;
use homelink_domain::event::{Event, EventKind};
use homelink_domain::id::ZoneId;

use crate::builder::request_level;

const SUBSCRIPTIONS: &[EventKind] = &[EventKind::ZonesReportRequested];

/// Sends `?OUTPUT` queries for the requested zones of one bridge.
///
/// The replies come back as `~OUTPUT` frames on the bridge's event stream,
/// where the producer decodes them like any other level change.
pub struct ZoneReportConsumer {
    name: String,
    device: SharedDevice,
    pool: ConnectionPool,
    lease_timeout: Duration,
}

impl ZoneReportConsumer {
    pub fn new(
        name: impl Into<String>,
        device: SharedDevice,
        pool: ConnectionPool,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            pool,
            lease_timeout,
        }
    }

    /// Addresses of this device's zones named in `requested`, sorted.
    fn addresses(&self, requested: &BTreeSet<ZoneId>) -> Vec<String> {
        let device = directory::read(&self.device);
        let mut addresses: Vec<String> = device
            .zones
            .values()
            .filter(|zone| requested.contains(&zone.id))
            .map(|zone| zone.address.clone())
            .collect();
        addresses.sort_unstable();
        addresses
    }

    #[tracing::instrument(skip(self), fields(consumer = %self.name))]
    async fn request(&self, address: &str) {
        let lease = match self.pool.lease(self.lease_timeout, false).await {
            Ok(lease) => lease,
            Err(err) => {
                tracing::warn!(%err, "no connection for level request");
                return;
            }
        };
        let result = send(&lease, address).await;
        if let Err(err) = &result {
            tracing::warn!(%err, "level request failed");
        }
        lease.release(result.err().as_ref());
    }
}

/// Discard replies left over from earlier queries, then write the query.
async fn send(lease: &Lease, address: &str) -> Result<(), HubError> {
    let mut transport = lease.lock().await;
    let mut scratch = [0_u8; 512];
    loop {
        match tokio::time::timeout(Duration::ZERO, transport.read(&mut scratch)).await {
            Ok(Ok(0)) => return Err(HubError::StreamClosed),
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => break,
        }
    }
    drop(transport);
    lease.write_all(&request_level(address)).await
}

#[async_trait]
impl EventConsumer for ZoneReportConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    async fn consume(&self, batch: Vec<Event>) {
        let requested: BTreeSet<ZoneId> = batch
            .into_iter()
            .filter_map(|event| match event {
                Event::ZonesReportRequested { zone_ids } => Some(zone_ids),
                _ => None,
            })
            .flatten()
            .collect();
        let addresses = self.addresses(&requested);
        tracing::debug!(consumer = %self.name, zones = addresses.len(), "requesting zone levels");
        for address in addresses {
            self.request(&address).await;
        }
    }
}
