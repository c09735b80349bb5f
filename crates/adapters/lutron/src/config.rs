//! Lutron integration configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration shared by every Lutron device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LutronConfig {
    /// Telnet login for the integration account.
    pub login: String,
    pub password: String,
    /// Port used when a device address carries none.
    pub default_port: u16,
    /// Budget for TCP connect plus login, in seconds.
    pub connect_timeout_secs: u64,
    /// How long the event stream waits for its connection, in seconds.
    pub stream_lease_timeout_secs: u64,
    /// How long a level request waits for a connection, in seconds.
    pub request_lease_timeout_secs: u64,
    /// Bridge reported by discovery, if known.
    pub bridge_address: Option<String>,
    /// Connections per bridge for discovered devices. One is held by the
    /// event stream, the rest serve requests.
    pub pool_size: usize,
}

impl Default for LutronConfig {
    fn default() -> Self {
        Self {
            login: "lutron".to_string(),
            password: "integration".to_string(),
            default_port: 23,
            connect_timeout_secs: 10,
            stream_lease_timeout_secs: 20,
            request_lease_timeout_secs: 10,
            bridge_address: None,
            pool_size: 2,
        }
    }
}

impl LutronConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn stream_lease_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_lease_timeout_secs)
    }

    #[must_use]
    pub fn request_lease_timeout(&self) -> Duration {
        Duration::from_secs(self.request_lease_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_factory_integration_account() {
        let config = LutronConfig::default();
        assert_eq!(config.login, "lutron");
        assert_eq!(config.password, "integration");
        assert_eq!(config.default_port, 23);
        assert_eq!(config.stream_lease_timeout(), Duration::from_secs(20));
        assert_eq!(config.request_lease_timeout(), Duration::from_secs(10));
        assert_eq!(config.pool_size, 2);
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let toml = r#"
            password = "s3cret"
            bridge_address = "192.168.1.20"
        "#;
        let config: LutronConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.bridge_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.login, "lutron");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}
