//! Command — an abstract intent aimed at one zone.
//!
//! Commands are vendor-neutral. A model's command builder turns them into
//! wire bytes, and can usually parse its own wire form back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::ZoneId;
use crate::zone::{MAX_LEVEL, Zone};

/// Identifies the zone a command is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTarget {
    pub zone_id: ZoneId,
    /// Protocol-level address of the zone on its device.
    pub address: String,
}

impl From<&Zone> for ZoneTarget {
    fn from(zone: &Zone) -> Self {
        Self {
            zone_id: zone.id,
            address: zone.address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    ZoneSetLevel { target: ZoneTarget, level: f32 },
    ZoneTurnOn { target: ZoneTarget },
    ZoneTurnOff { target: ZoneTarget },
    /// Ask the device to report the zone's current level.
    ZoneRequestLevel { target: ZoneTarget },
}

impl Command {
    /// Build a [`ZoneSetLevel`](Self::ZoneSetLevel) command.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LevelOutOfRange`] for levels outside
    /// `0..=100`.
    pub fn set_level(target: impl Into<ZoneTarget>, level: f32) -> Result<Self, HubError> {
        if !(0.0..=MAX_LEVEL).contains(&level) {
            return Err(ValidationError::LevelOutOfRange(level).into());
        }
        Ok(Self::ZoneSetLevel {
            target: target.into(),
            level,
        })
    }

    #[must_use]
    pub fn target(&self) -> &ZoneTarget {
        match self {
            Self::ZoneSetLevel { target, .. }
            | Self::ZoneTurnOn { target }
            | Self::ZoneTurnOff { target }
            | Self::ZoneRequestLevel { target } => target,
        }
    }

    /// The level the zone ends up at once the command is executed, if the
    /// command changes it at all.
    #[must_use]
    pub fn target_level(&self) -> Option<f32> {
        match self {
            Self::ZoneSetLevel { level, .. } => Some(*level),
            Self::ZoneTurnOn { .. } => Some(MAX_LEVEL),
            Self::ZoneTurnOff { .. } => Some(0.0),
            Self::ZoneRequestLevel { .. } => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = &self.target().address;
        match self {
            Self::ZoneSetLevel { level, .. } => write!(f, "set zone {target} to {level:.2}"),
            Self::ZoneTurnOn { .. } => write!(f, "turn zone {target} on"),
            Self::ZoneTurnOff { .. } => write!(f, "turn zone {target} off"),
            Self::ZoneRequestLevel { .. } => write!(f, "request level of zone {target}"),
        }
    }
}
