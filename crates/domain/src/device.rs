//! Device — a managed physical unit integrated through one vendor extension.
//!
//! A device owns its zones (keyed by protocol address) and sensors (keyed by
//! id), and optionally the configuration of the connection pool used to talk
//! to it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::{DeviceId, SensorId, ZoneId};
use crate::sensor::Sensor;
use crate::zone::Zone;

/// Connection pool settings for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Label used in logs.
    pub name: String,
    /// Maximum number of concurrent leases.
    pub size: usize,
}

impl PoolConfig {
    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPool`] when `size` is zero.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.size == 0 {
            return Err(ValidationError::EmptyPool.into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub address: String,
    pub model: String,
    pub name: String,
    pub description: String,
    pub zones: HashMap<String, Zone>,
    pub sensors: HashMap<SensorId, Sensor>,
    pub pool: Option<PoolConfig>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `name` or `model` is empty, or
    /// the pool configuration is invalid.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.model.is_empty() {
            return Err(ValidationError::EmptyModel.into());
        }
        if let Some(pool) = &self.pool {
            pool.validate()?;
        }
        Ok(())
    }

    /// Attach a zone to this device.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateZoneAddress`] when another zone
    /// already uses the same address.
    pub fn add_zone(&mut self, zone: Zone) -> Result<(), HubError> {
        zone.validate()?;
        if self.zones.contains_key(&zone.address) {
            return Err(ValidationError::DuplicateZoneAddress(zone.address).into());
        }
        self.zones.insert(zone.address.clone(), zone);
        Ok(())
    }

    /// Attach a sensor to this device.
    pub fn add_sensor(&mut self, sensor: Sensor) {
        self.sensors.insert(sensor.id, sensor);
    }

    /// Find a zone by its protocol address.
    #[must_use]
    pub fn zone_by_address(&self, address: &str) -> Option<&Zone> {
        self.zones.get(address)
    }

    /// Find a zone by its system-wide id.
    #[must_use]
    pub fn zone_by_id(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.values().find(|zone| zone.id == id)
    }

    /// Mutable variant of [`zone_by_id`](Self::zone_by_id).
    pub fn zone_by_id_mut(&mut self, id: ZoneId) -> Option<&mut Zone> {
        self.zones.values_mut().find(|zone| zone.id == id)
    }

    /// Ids of every zone owned by this device.
    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.values().map(|zone| zone.id)
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    address: Option<String>,
    model: Option<String>,
    name: Option<String>,
    description: Option<String>,
    zones: Vec<Zone>,
    sensors: Vec<Sensor>,
    pool: Option<PoolConfig>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
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
    pub fn zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    #[must_use]
    pub fn sensor(mut self, sensor: Sensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    #[must_use]
    pub fn pool(mut self, name: impl Into<String>, size: usize) -> Self {
        self.pool = Some(PoolConfig {
            name: name.into(),
            size,
        });
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if `name` or `model` is missing, the
    /// pool size is zero, or two zones share an address.
    pub fn build(self) -> Result<Device, HubError> {
        let mut device = Device {
            id: self.id.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            zones: HashMap::new(),
            sensors: HashMap::new(),
            pool: self.pool,
        };
        device.validate()?;
        for zone in self.zones {
            device.add_zone(zone)?;
        }
        for sensor in self.sensors {
            device.add_sensor(sensor);
        }
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(address: &str, name: &str) -> Zone {
        Zone::builder().address(address).name(name).build().unwrap()
    }

    #[test]
    fn should_build_device_with_zones_keyed_by_address() {
        let device = Device::builder()
            .name("Smart Bridge")
            .model("l-bdgpro2-wh")
            .address("192.168.1.20:23")
            .zone(zone("3", "Kitchen"))
            .zone(zone("4", "Hall"))
            .pool("bridge", 2)
            .build()
            .unwrap();

        assert_eq!(device.zones.len(), 2);
        assert_eq!(device.zone_by_address("3").unwrap().name, "Kitchen");
        assert_eq!(device.pool.as_ref().map(|p| p.size), Some(2));
    }

    #[test]
    fn should_reject_duplicate_zone_address() {
        let result = Device::builder()
            .name("Bridge")
            .model("l-bdgpro2-wh")
            .zone(zone("3", "Kitchen"))
            .zone(zone("3", "Dining"))
            .build();

        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::DuplicateZoneAddress(a))) if a == "3"
        ));
    }

    #[test]
    fn should_reject_missing_model() {
        let result = Device::builder().name("Bridge").build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyModel))
        ));
    }

    #[test]
    fn should_reject_zero_sized_pool() {
        let result = Device::builder()
            .name("Bridge")
            .model("l-bdgpro2-wh")
            .pool("bridge", 0)
            .build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyPool))
        ));
    }

    #[test]
    fn should_find_zone_by_id() {
        let kitchen = zone("3", "Kitchen");
        let id = kitchen.id;
        let mut device = Device::builder()
            .name("Bridge")
            .model("l-bdgpro2-wh")
            .zone(kitchen)
            .build()
            .unwrap();

        assert_eq!(device.zone_by_id(id).map(|z| z.address.as_str()), Some("3"));
        assert!(device.zone_by_id_mut(id).is_some());
        assert!(device.zone_by_id(ZoneId::new()).is_none());
        assert_eq!(device.zone_ids().collect::<Vec<_>>(), vec![id]);
    }
}
