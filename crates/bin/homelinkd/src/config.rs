//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homelink.toml` in the working directory (or the file named by
//! `HOMELINK_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use homelink_adapter_lutron::LutronConfig;
use homelink_domain::device::{Device, PoolConfig};
use homelink_domain::error::HubError;
use homelink_domain::sensor::{Sensor, SensorAttr, SensorDataType};
use homelink_domain::zone::{OutputKind, Zone, ZoneType};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Event bus settings.
    pub bus: BusConfig,
    /// Integration settings shared by every device.
    pub integrations: IntegrationsConfig,
    /// Lutron extension settings.
    pub lutron: LutronConfig,
    /// Devices managed at startup.
    pub devices: Vec<DeviceConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Event bus configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events buffered per consumer before coalescing or dropping kicks in.
    pub queue_capacity: usize,
}

/// Integration configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Seconds a command waits for a device connection.
    pub dispatch_timeout_secs: u64,
}

impl IntegrationsConfig {
    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

/// One managed device.
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    pub model: String,
    pub pool: Option<PoolConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    /// Vendor integration report run through the model's importer.
    pub import_report: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneConfig {
    pub address: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub zone_type: ZoneType,
    #[serde(default)]
    pub output: OutputKind,
}

#[derive(Debug, Deserialize)]
pub struct SensorConfig {
    pub address: String,
    pub name: String,
    pub attribute: String,
    #[serde(default)]
    pub data_type: SensorDataType,
}

impl Config {
    /// Load configuration from `homelink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("HOMELINK_CONFIG").unwrap_or_else(|_| "homelink.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOMELINK_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.bus.queue_capacity = capacity;
            }
        }
        if let Ok(val) = std::env::var("HOMELINK_DISPATCH_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.integrations.dispatch_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("HOMELINK_LUTRON_LOGIN") {
            self.lutron.login = val;
        }
        if let Ok(val) = std::env::var("HOMELINK_LUTRON_PASSWORD") {
            self.lutron.password = val;
        }
        if let Ok(val) = std::env::var("HOMELINK_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "bus queue capacity must be non-zero".to_string(),
            ));
        }
        if self.integrations.dispatch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "dispatch timeout must be non-zero".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "device {:?} is declared twice",
                    device.name
                )));
            }
            if device.pool.as_ref().is_some_and(|pool| pool.size == 0) {
                return Err(ConfigError::Validation(format!(
                    "device {:?} has an empty connection pool",
                    device.name
                )));
            }
        }
        Ok(())
    }
}

impl DeviceConfig {
    /// Build the domain device described by this entry, without the zones
    /// an integration report may add.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when an entry breaks a device, zone
    /// or sensor invariant.
    pub fn to_device(&self) -> Result<Device, HubError> {
        let mut builder = Device::builder()
            .name(self.name.as_str())
            .description(self.description.as_str())
            .address(self.address.as_str())
            .model(self.model.as_str());
        if let Some(pool) = &self.pool {
            builder = builder.pool(pool.name.as_str(), pool.size);
        }
        for zone in &self.zones {
            builder = builder.zone(
                Zone::builder()
                    .address(zone.address.as_str())
                    .name(zone.name.as_str())
                    .zone_type(zone.zone_type)
                    .output(zone.output)
                    .build()?,
            );
        }
        for sensor in &self.sensors {
            let attr = SensorAttr {
                name: sensor.attribute.clone(),
                data_type: sensor.data_type,
            };
            builder = builder.sensor(Sensor::new(
                sensor.address.as_str(),
                sensor.name.as_str(),
                attr,
            )?);
        }
        builder.build()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homelinkd=info,homelink_app=info,homelink_adapter_lutron=info".to_string(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
