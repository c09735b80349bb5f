//! Level tracker — keeps zone levels in the directory in sync with the
//! levels devices report.

use async_trait::async_trait;

use homelink_domain::event::{Event, EventKind};

use crate::directory::DeviceDirectory;
use crate::ports::extension::EventConsumer;

const SUBSCRIPTIONS: &[EventKind] = &[EventKind::ZoneLevelChanged];

/// Core consumer writing every reported level into its zone.
pub struct LevelTracker {
    directory: DeviceDirectory,
}

impl LevelTracker {
    #[must_use]
    pub fn new(directory: DeviceDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl EventConsumer for LevelTracker {
    fn name(&self) -> &str {
        "level-tracker"
    }

    fn subscriptions(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    async fn consume(&self, batch: Vec<Event>) {
        for event in batch {
            let Event::ZoneLevelChanged {
                zone_id,
                zone_name,
                level,
            } = event
            else {
                continue;
            };
            match self.directory.set_zone_level(zone_id, level) {
                Ok(true) => tracing::info!(zone = %zone_name, level, "zone level changed"),
                Ok(false) => tracing::trace!(zone = %zone_name, level, "zone level unchanged"),
                Err(err) => tracing::warn!(zone = %zone_name, %err, "cannot record zone level"),
            }
        }
    }
}
