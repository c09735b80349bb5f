//! Zone — a controllable output endpoint owned by a device.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::ZoneId;

/// Highest level a zone accepts.
pub const MAX_LEVEL: f32 = 100.0;

/// What kind of load sits behind the zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Light,
    Shade,
    Switch,
    #[default]
    Unknown,
}

/// How the output drives its load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Any level between 0 and 100 (dimmers).
    #[default]
    Continuous,
    /// Only 0 or 100 (relays).
    Binary,
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Shade => f.write_str("shade"),
            Self::Switch => f.write_str("switch"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A controllable endpoint. The address is the protocol-level identifier and
/// is unique within the owning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub address: String,
    pub name: String,
    pub description: String,
    pub zone_type: ZoneType,
    pub output: OutputKind,
    pub level: f32,
    pub last_changed: Option<DateTime<Utc>>,
}

impl Zone {
    /// Create a builder for constructing a [`Zone`].
    #[must_use]
    pub fn builder() -> ZoneBuilder {
        ZoneBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `address` or `name` is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// Record a new physical level.
    ///
    /// Binary outputs snap to 0 or 100. `last_changed` only moves when the
    /// level actually differs; the return value says whether it did.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LevelOutOfRange`] for levels outside
    /// `0..=100`; the zone is left untouched.
    pub fn set_level(&mut self, level: f32, at: DateTime<Utc>) -> Result<bool, HubError> {
        if !(0.0..=MAX_LEVEL).contains(&level) {
            return Err(ValidationError::LevelOutOfRange(level).into());
        }
        let level = match self.output {
            OutputKind::Continuous => level,
            OutputKind::Binary if level > 0.0 => MAX_LEVEL,
            OutputKind::Binary => 0.0,
        };
        if (self.level - level).abs() <= f32::EPSILON {
            return Ok(false);
        }
        self.level = level;
        self.last_changed = Some(at);
        Ok(true)
    }
}

/// Step-by-step builder for [`Zone`].
#[derive(Debug, Default)]
pub struct ZoneBuilder {
    id: Option<ZoneId>,
    address: Option<String>,
    name: Option<String>,
    description: Option<String>,
    zone_type: ZoneType,
    output: OutputKind,
}

impl ZoneBuilder {
    #[must_use]
    pub fn id(mut self, id: ZoneId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn zone_type(mut self, zone_type: ZoneType) -> Self {
        self.zone_type = zone_type;
        self
    }

    #[must_use]
    pub fn output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    /// Consume the builder, validate, and return a [`Zone`] at level 0.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if `address` or `name` is missing.
    pub fn build(self) -> Result<Zone, HubError> {
        let zone = Zone {
            id: self.id.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            zone_type: self.zone_type,
            output: self.output,
            level: 0.0,
            last_changed: None,
        };
        zone.validate()?;
        Ok(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimmer() -> Zone {
        Zone::builder()
            .address("3")
            .name("Kitchen Pendants")
            .zone_type(ZoneType::Light)
            .build()
            .unwrap()
    }

    #[test]
    fn should_build_zone_at_level_zero() {
        let zone = dimmer();
        assert_eq!(zone.address, "3");
        assert!(zone.level.abs() < f32::EPSILON);
        assert!(zone.last_changed.is_none());
    }

    #[test]
    fn should_reject_zone_without_address() {
        let result = Zone::builder().name("Hall").build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyAddress))
        ));
    }

    #[test]
    fn should_update_level_and_timestamp() {
        let mut zone = dimmer();
        let at = Utc::now();
        assert!(zone.set_level(75.0, at).unwrap());
        assert!((zone.level - 75.0).abs() < f32::EPSILON);
        assert_eq!(zone.last_changed, Some(at));
    }

    #[test]
    fn should_keep_timestamp_when_level_unchanged() {
        let mut zone = dimmer();
        assert!(!zone.set_level(0.0, Utc::now()).unwrap());
        assert!(zone.last_changed.is_none());
    }

    #[test]
    fn should_reject_level_above_hundred() {
        let mut zone = dimmer();
        let result = zone.set_level(100.5, Utc::now());
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::LevelOutOfRange(_)))
        ));
        assert!(zone.level.abs() < f32::EPSILON);
    }

    #[test]
    fn should_snap_binary_output_to_full_level() {
        let mut zone = Zone::builder()
            .address("7")
            .name("Porch")
            .output(OutputKind::Binary)
            .build()
            .unwrap();
        zone.set_level(12.5, Utc::now()).unwrap();
        assert!((zone.level - MAX_LEVEL).abs() < f32::EPSILON);
    }

    #[test]
    fn should_deserialize_lowercase_zone_type() {
        let parsed: ZoneType = serde_json::from_str("\"shade\"").unwrap();
        assert_eq!(parsed, ZoneType::Shade);
        assert_eq!(parsed.to_string(), "shade");
    }
}
