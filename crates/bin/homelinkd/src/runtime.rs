//! Runtime wiring — registry, bus, core consumers, devices, integrations.

use std::sync::Arc;

use anyhow::Context;

use homelink_app::directory::DeviceDirectory;
use homelink_app::event_bus::InProcessEventBus;
use homelink_app::ports::event_bus::EventPublisher;
use homelink_app::registry::ExtensionRegistry;
use homelink_app::services::device_monitor::DeviceMonitor;
use homelink_app::services::device_service::DeviceService;
use homelink_app::services::integration_service::IntegrationService;
use homelink_app::services::level_tracker::LevelTracker;

use crate::config::{Config, DeviceConfig};

/// A fully wired runtime. Integrations run between [`start`](Self::start)
/// and [`shutdown`](Self::shutdown).
pub struct Runtime {
    pub directory: DeviceDirectory,
    pub devices: DeviceService,
    pub integrations: IntegrationService,
}

impl Runtime {
    /// Wire everything described by `config`. Must be called from within a
    /// Tokio runtime: the core consumers start immediately.
    ///
    /// Devices that cannot be registered are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when an extension cannot be registered.
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        let mut registry = ExtensionRegistry::new();
        homelink_adapter_lutron::register(&mut registry, config.lutron.clone())
            .context("registering lutron extension")?;
        let registry = Arc::new(registry);

        let directory = DeviceDirectory::new();
        let bus = InProcessEventBus::new(config.bus.queue_capacity);
        bus.add_consumer(Arc::new(LevelTracker::new(directory.clone())));
        bus.add_consumer(Arc::new(DeviceMonitor::new(
            directory.clone(),
            Arc::new(bus.clone()) as Arc<dyn EventPublisher>,
        )));

        let devices = DeviceService::new(Arc::clone(&registry), directory.clone());
        for entry in &config.devices {
            if let Err(err) = add_device(&devices, entry) {
                tracing::error!(device = %entry.name, error = ?err, "skipping device");
            }
        }

        let integrations = IntegrationService::new(registry, bus, directory.clone())
            .with_dispatch_timeout(config.integrations.dispatch_timeout());
        Ok(Self {
            directory,
            devices,
            integrations,
        })
    }

    /// Start the integration of every registered device.
    ///
    /// Returns how many started.
    pub fn start(&self) -> usize {
        self.integrations.start_all()
    }

    /// Stop producers first, then drain and stop consumers.
    pub async fn shutdown(&self) {
        self.integrations.shutdown().await;
    }
}

fn add_device(devices: &DeviceService, entry: &DeviceConfig) -> anyhow::Result<()> {
    let device = entry.to_device()?;
    match &entry.import_report {
        Some(path) => {
            let report = std::fs::read_to_string(path)
                .with_context(|| format!("reading integration report {}", path.display()))?;
            devices.import(device, &report)?;
        }
        None => {
            devices.register(device)?;
        }
    }
    Ok(())
}
