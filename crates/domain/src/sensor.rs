//! Sensor — a read-only input owned by a device.

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::SensorId;

/// Data type tag of a sensor attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorDataType {
    #[default]
    Bool,
    Int,
    Float,
    String,
}

/// Describes the value a sensor reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorAttr {
    pub name: String,
    pub data_type: SensorDataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub address: String,
    pub name: String,
    pub description: String,
    pub attr: SensorAttr,
}

impl Sensor {
    /// Create a sensor with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `address` or `name` is empty.
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        attr: SensorAttr,
    ) -> Result<Self, HubError> {
        let sensor = Self {
            id: SensorId::new(),
            address: address.into(),
            name: name.into(),
            description: String::new(),
            attr,
        };
        if sensor.address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }
        if sensor.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(sensor)
    }
}
