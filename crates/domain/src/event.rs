//! Event — an immutable message carried by the event bus.
//!
//! Events are published by device producers (decoded protocol frames) and by
//! core consumers (refresh requests). Request-style events can be merged with
//! queued siblings of the same [`EventKind`] before a consumer acts on them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, ZoneId};

/// The category of an [`Event`], used for subscriptions and merge keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeviceProducingStarted,
    ZoneLevelChanged,
    ZonesReportRequested,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceProducingStarted => f.write_str("device_producing_started"),
            Self::ZoneLevelChanged => f.write_str("zone_level_changed"),
            Self::ZonesReportRequested => f.write_str("zones_report_requested"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A device's event stream is live.
    DeviceProducingStarted { device_id: DeviceId },
    /// A zone reported a new physical level.
    ZoneLevelChanged {
        zone_id: ZoneId,
        zone_name: String,
        level: f32,
    },
    /// Someone wants these zones to report their current level.
    ZonesReportRequested { zone_ids: BTreeSet<ZoneId> },
}

impl Event {
    /// Build a [`ZonesReportRequested`](Self::ZonesReportRequested) event.
    pub fn zones_report(zone_ids: impl IntoIterator<Item = ZoneId>) -> Self {
        Self::ZonesReportRequested {
            zone_ids: zone_ids.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DeviceProducingStarted { .. } => EventKind::DeviceProducingStarted,
            Self::ZoneLevelChanged { .. } => EventKind::ZoneLevelChanged,
            Self::ZonesReportRequested { .. } => EventKind::ZonesReportRequested,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceProducingStarted { device_id } => {
                write!(f, "device {device_id} producing")
            }
            Self::ZoneLevelChanged {
                zone_name, level, ..
            } => write!(f, "zone {zone_name:?} at {level:.2}"),
            Self::ZonesReportRequested { zone_ids } => {
                write!(f, "report requested for {} zone(s)", zone_ids.len())
            }
        }
    }
}
