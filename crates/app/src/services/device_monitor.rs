//! Device monitor — refreshes zone levels whenever a device stream goes live.

use std::sync::Arc;

use async_trait::async_trait;

use homelink_domain::event::{Event, EventKind};

use crate::directory::{self, DeviceDirectory};
use crate::ports::event_bus::EventPublisher;
use crate::ports::extension::EventConsumer;

const SUBSCRIPTIONS: &[EventKind] = &[EventKind::DeviceProducingStarted];

/// Core consumer asking for a report of every zone of a device once its
/// producer is streaming, so levels changed while disconnected are picked up.
pub struct DeviceMonitor {
    directory: DeviceDirectory,
    publisher: Arc<dyn EventPublisher>,
}

impl DeviceMonitor {
    pub fn new(directory: DeviceDirectory, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            directory,
            publisher,
        }
    }
}

#[async_trait]
impl EventConsumer for DeviceMonitor {
    fn name(&self) -> &str {
        "device-monitor"
    }

    fn subscriptions(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    async fn consume(&self, batch: Vec<Event>) {
        for event in batch {
            let Event::DeviceProducingStarted { device_id } = event else {
                continue;
            };
            let Ok(device) = self.directory.get(device_id) else {
                tracing::debug!(device = %device_id, "producing device is no longer managed");
                continue;
            };
            let zone_ids: Vec<_> = directory::read(&device).zone_ids().collect();
            if zone_ids.is_empty() {
                continue;
            }
            tracing::debug!(device = %device_id, zones = zone_ids.len(), "requesting zone report");
            self.publisher.enqueue(Event::zones_report(zone_ids));
        }
    }
}
