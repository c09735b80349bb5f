//! Bridge discovery.

use async_trait::async_trait;

use homelink_app::ports::extension::Network;
use homelink_domain::device::Device;
use homelink_domain::error::HubError;

use crate::config::LutronConfig;

/// Reports the configured bridge as a device template.
///
/// The bridge does not announce itself in a way we listen for, so discovery
/// only knows what [`LutronConfig::bridge_address`] says.
#[derive(Debug, Clone)]
pub struct BridgeNetwork {
    config: LutronConfig,
}

impl BridgeNetwork {
    #[must_use]
    pub fn new(config: LutronConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Network for BridgeNetwork {
    async fn devices(&self, model: &str) -> Result<Vec<Device>, HubError> {
        let Some(address) = &self.config.bridge_address else {
            tracing::info!(model, "no bridge address configured");
            return Ok(Vec::new());
        };
        let device = Device::builder()
            .name("Smart Bridge Pro")
            .description("Lutron Caséta Smart Bridge Pro")
            .model(model)
            .address(address.as_str())
            .pool("lutron", self.config.pool_size)
            .build()?;
        Ok(vec![device])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_report_configured_bridge() {
        let network = BridgeNetwork::new(LutronConfig {
            bridge_address: Some("10.0.0.4".to_string()),
            ..LutronConfig::default()
        });

        let devices = network.devices("l-bdgpro2-wh").await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "10.0.0.4");
        assert_eq!(devices[0].model, "l-bdgpro2-wh");
        assert_eq!(devices[0].pool.as_ref().unwrap().size, 2);
    }

    #[tokio::test]
    async fn should_find_nothing_without_address() {
        let network = BridgeNetwork::new(LutronConfig::default());
        assert!(network.devices("l-bdgpro2-wh").await.unwrap().is_empty());
    }
}
