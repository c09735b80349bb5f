//! Device service — registering, importing and discovering devices.
//!
//! This is the path through which the extension bundle's `Network` and
//! `Importer` capabilities are reached.

use std::sync::Arc;

use homelink_domain::device::Device;
use homelink_domain::error::{HubError, UnsupportedError};
use homelink_domain::id::DeviceId;

use crate::directory::{DeviceDirectory, SharedDevice};
use crate::registry::ExtensionRegistry;

pub struct DeviceService {
    registry: Arc<ExtensionRegistry>,
    directory: DeviceDirectory,
}

impl DeviceService {
    pub fn new(registry: Arc<ExtensionRegistry>, directory: DeviceDirectory) -> Self {
        Self {
            registry,
            directory,
        }
    }

    /// Add a fully described device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if invariants fail, or
    /// [`HubError::Unsupported`] when no extension claims the model.
    #[tracing::instrument(skip(self, device), fields(device = %device.name, model = %device.model))]
    pub fn register(&self, device: Device) -> Result<SharedDevice, HubError> {
        device.validate()?;
        self.registry.require(&device.model)?;
        let shared = self.directory.insert(device)?;
        tracing::info!("device registered");
        Ok(shared)
    }

    /// Populate `device` from a vendor export through its model's importer,
    /// then register it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unsupported`] when the model has no importer, or
    /// the importer's error when the export cannot be read.
    #[tracing::instrument(skip(self, device, source), fields(device = %device.name, model = %device.model))]
    pub fn import(&self, mut device: Device, source: &str) -> Result<SharedDevice, HubError> {
        let importer = self
            .registry
            .require(&device.model)?
            .importer()
            .ok_or_else(|| unsupported(&device.model, "import"))?;
        let zones = importer.import(&mut device, source)?;
        tracing::info!(zones, "device imported");
        self.register(device)
    }

    /// Ask the model's network capability for devices to import.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unsupported`] when the model has no discovery.
    #[tracing::instrument(skip(self))]
    pub async fn discover(&self, model: &str) -> Result<Vec<Device>, HubError> {
        let network = self
            .registry
            .require(model)?
            .network()
            .ok_or_else(|| unsupported(model, "discovery"))?;
        let devices = network.devices(model).await?;
        tracing::info!(found = devices.len(), "discovery finished");
        Ok(devices)
    }

    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when no device has this id.
    pub fn get(&self, id: DeviceId) -> Result<Device, HubError> {
        self.directory.snapshot(id)
    }

    #[must_use]
    pub fn list(&self) -> Vec<Device> {
        self.directory.list()
    }
}

fn unsupported(model: &str, capability: &'static str) -> HubError {
    UnsupportedError {
        model: model.to_string(),
        capability,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use homelink_domain::error::ValidationError;
    use homelink_domain::zone::Zone;

    use super::*;
    use crate::ports::extension::{Bundle, Importer, Network};

    /// Imports one zone per non-empty line: `<address> <name>`.
    struct LineImporter;

    impl Importer for LineImporter {
        fn import(&self, device: &mut Device, source: &str) -> Result<usize, HubError> {
            let mut added = 0;
            for line in source.lines().filter(|l| !l.trim().is_empty()) {
                let (address, name) = line.split_once(' ').unwrap_or((line, line));
                device.add_zone(Zone::builder().address(address).name(name).build()?)?;
                added += 1;
            }
            Ok(added)
        }
    }

    struct OneBridge;

    #[async_trait]
    impl Network for OneBridge {
        async fn devices(&self, model: &str) -> Result<Vec<Device>, HubError> {
            Ok(vec![Device::builder().name("Bridge").model(model).build()?])
        }
    }

    struct Full;

    impl Bundle for Full {
        fn extension(&self) -> &'static str {
            "full"
        }

        fn network(&self) -> Option<Arc<dyn Network>> {
            Some(Arc::new(OneBridge))
        }

        fn importer(&self) -> Option<Arc<dyn Importer>> {
            Some(Arc::new(LineImporter))
        }
    }

    struct Bare;

    impl Bundle for Bare {
        fn extension(&self) -> &'static str {
            "bare"
        }
    }

    fn service() -> DeviceService {
        let mut registry = ExtensionRegistry::new();
        registry.register(&["full-1"], Arc::new(Full)).unwrap();
        registry.register(&["bare-1"], Arc::new(Bare)).unwrap();
        DeviceService::new(Arc::new(registry), DeviceDirectory::new())
    }

    fn device(model: &str) -> Device {
        Device::builder().name("Bridge").model(model).build().unwrap()
    }

    #[test]
    fn should_import_zones_then_register_device() {
        let service = service();
        let shared = service
            .import(device("full-1"), "3 Kitchen\n4 Hall\n")
            .unwrap();
        let id = crate::directory::read(&shared).id;

        let stored = service.get(id).unwrap();
        assert_eq!(stored.zones.len(), 2);
        assert_eq!(stored.zone_by_address("4").unwrap().name, "Hall");
    }

    #[test]
    fn should_propagate_importer_failure() {
        let service = service();
        let result = service.import(device("full-1"), "3 Kitchen\n3 Dining\n");
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::DuplicateZoneAddress(_)))
        ));
        assert!(service.list().is_empty());
    }

    #[test]
    fn should_report_missing_importer_as_unsupported() {
        let service = service();
        let result = service.import(device("bare-1"), "3 Kitchen");
        assert!(matches!(
            result,
            Err(HubError::Unsupported(UnsupportedError { capability: "import", .. }))
        ));
    }

    #[test]
    fn should_refuse_unclaimed_model() {
        let service = service();
        assert!(matches!(
            service.register(device("mystery")),
            Err(HubError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn should_discover_through_network_capability() {
        let service = service();
        let found = service.discover("full-1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].model, "full-1");

        assert!(matches!(
            service.discover("bare-1").await,
            Err(HubError::Unsupported(_))
        ));
    }
}
