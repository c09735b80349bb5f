//! In-memory directory of managed devices.
//!
//! Devices are shared between the runtime and the per-device producers and
//! consumers, so each lives behind its own lock. Lock scopes stay short and
//! are never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use homelink_domain::device::Device;
use homelink_domain::error::{HubError, NotFoundError};
use homelink_domain::id::{DeviceId, ZoneId};
use homelink_domain::zone::Zone;

/// A device shared across tasks.
pub type SharedDevice = Arc<RwLock<Device>>;

/// Read-lock a shared device, recovering from poisoning.
pub fn read(device: &SharedDevice) -> RwLockReadGuard<'_, Device> {
    device.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock a shared device, recovering from poisoning.
pub fn write(device: &SharedDevice) -> RwLockWriteGuard<'_, Device> {
    device.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: Arc<RwLock<HashMap<DeviceId, SharedDevice>>>,
}

impl DeviceDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> RwLockReadGuard<'_, HashMap<DeviceId, SharedDevice>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn map_mut(&self) -> RwLockWriteGuard<'_, HashMap<DeviceId, SharedDevice>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or replace) a device, returning its shared handle.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the device is invalid.
    pub fn insert(&self, device: Device) -> Result<SharedDevice, HubError> {
        device.validate()?;
        let id = device.id;
        let shared = Arc::new(RwLock::new(device));
        self.map_mut().insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when no device has this id.
    pub fn get(&self, id: DeviceId) -> Result<SharedDevice, HubError> {
        self.map().get(&id).cloned().ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Forget a device. A running integration is not stopped here, see
    /// `IntegrationService::remove_device`.
    pub fn remove(&self, id: DeviceId) -> Option<SharedDevice> {
        self.map_mut().remove(&id)
    }

    /// Find the device owning `zone_id`.
    #[must_use]
    pub fn find_zone(&self, zone_id: ZoneId) -> Option<(SharedDevice, Zone)> {
        self.map().values().find_map(|device| {
            let zone = read(device).zone_by_id(zone_id).cloned()?;
            Some((Arc::clone(device), zone))
        })
    }

    /// Record a reported level. Returns whether the stored level changed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for unknown zones and
    /// [`HubError::Validation`] for out-of-range levels.
    pub fn set_zone_level(&self, zone_id: ZoneId, level: f32) -> Result<bool, HubError> {
        let not_found = || NotFoundError {
            entity: "Zone",
            id: zone_id.to_string(),
        };
        let (device, _) = self.find_zone(zone_id).ok_or_else(not_found)?;
        let mut device = write(&device);
        let zone = device.zone_by_id_mut(zone_id).ok_or_else(not_found)?;
        zone.set_level(level, Utc::now())
    }

    /// Snapshot every device, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.map().values().map(|d| read(d).clone()).collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    /// Snapshot one device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when no device has this id.
    pub fn snapshot(&self, id: DeviceId) -> Result<Device, HubError> {
        let shared = self.get(id)?;
        let device = read(&shared).clone();
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use homelink_domain::error::ValidationError;

    use super::*;

    fn device(name: &str, zone_address: &str) -> Device {
        Device::builder()
            .name(name)
            .model("l-bdgpro2-wh")
            .zone(
                Zone::builder()
                    .address(zone_address)
                    .name("Kitchen")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn should_return_not_found_for_unknown_device() {
        let directory = DeviceDirectory::new();
        assert!(matches!(
            directory.get(DeviceId::new()),
            Err(HubError::NotFound(_))
        ));
    }

    #[test]
    fn should_update_zone_level_through_shared_handle() {
        let directory = DeviceDirectory::new();
        let shared = directory.insert(device("Bridge", "3")).unwrap();
        let zone_id = read(&shared).zone_by_address("3").unwrap().id;

        assert!(directory.set_zone_level(zone_id, 75.0).unwrap());
        assert!(!directory.set_zone_level(zone_id, 75.0).unwrap());

        let level = read(&shared).zone_by_id(zone_id).unwrap().level;
        assert!((level - 75.0).abs() < f32::EPSILON);
    }

    #[test]
    fn should_reject_level_for_unknown_zone() {
        let directory = DeviceDirectory::new();
        directory.insert(device("Bridge", "3")).unwrap();
        assert!(matches!(
            directory.set_zone_level(ZoneId::new(), 10.0),
            Err(HubError::NotFound(_))
        ));
    }

    #[test]
    fn should_reject_out_of_range_level() {
        let directory = DeviceDirectory::new();
        let shared = directory.insert(device("Bridge", "3")).unwrap();
        let zone_id = read(&shared).zone_by_address("3").unwrap().id;
        assert!(matches!(
            directory.set_zone_level(zone_id, 180.0),
            Err(HubError::Validation(ValidationError::LevelOutOfRange(_)))
        ));
    }

    #[test]
    fn should_list_devices_sorted_by_name() {
        let directory = DeviceDirectory::new();
        directory.insert(device("Upstairs", "1")).unwrap();
        directory.insert(device("Downstairs", "1")).unwrap();

        let names: Vec<String> = directory.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Downstairs", "Upstairs"]);
    }
}
