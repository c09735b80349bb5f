//! # homelink-adapter-lutron
//!
//! Lutron adapter — integrates Caséta Smart Bridge Pro controllers through
//! the bridge's telnet integration protocol.
//!
//! ## Responsibilities
//! - Log in to the bridge and keep pooled integration sessions ([`transport`])
//! - Decode `~OUTPUT` level reports into domain events ([`protocol`])
//! - Encode zone commands as `#OUTPUT` / `?OUTPUT` frames ([`builder`])
//! - Answer zone report requests by querying the bridge ([`consumer`])
//! - Import the bridge's JSON integration report ([`importer`])
//!
//! ## Dependency rule
//! Depends on `homelink-app` (ports, pool, producer) and `homelink-domain`.
//! The runtime never depends on this crate; the daemon registers it.

pub mod builder;
pub mod config;
pub mod consumer;
pub mod error;
pub mod importer;
pub mod network;
pub mod protocol;
pub mod transport;

use std::sync::Arc;

use homelink_app::directory;
use homelink_app::ports::extension::{
    Bundle, CommandBuilder, DeviceContext, DeviceEvents, Importer, Network,
};
use homelink_app::ports::transport::Dialer;
use homelink_app::producer::{ProducerConfig, StreamProducer};
use homelink_app::registry::ExtensionRegistry;
use homelink_domain::device::Device;
use homelink_domain::error::HubError;

pub use config::LutronConfig;
pub use error::LutronError;

use builder::OutputCommandBuilder;
use consumer::ZoneReportConsumer;
use importer::ReportImporter;
use network::BridgeNetwork;
use protocol::OutputDecoder;
use transport::TelnetDialer;

/// Name the extension registers under.
pub const EXTENSION: &str = "lutron";

/// Caséta Smart Bridge Pro.
pub const MODEL_SMART_BRIDGE_PRO: &str = "l-bdgpro2-wh";

/// Every model this extension claims.
pub const MODELS: &[&str] = &[MODEL_SMART_BRIDGE_PRO];

/// Capability bundle for Lutron bridges.
#[derive(Debug, Clone, Default)]
pub struct LutronBundle {
    config: LutronConfig,
}

impl LutronBundle {
    #[must_use]
    pub fn new(config: LutronConfig) -> Self {
        Self { config }
    }
}

impl Bundle for LutronBundle {
    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn network(&self) -> Option<Arc<dyn Network>> {
        Some(Arc::new(BridgeNetwork::new(self.config.clone())))
    }

    fn importer(&self) -> Option<Arc<dyn Importer>> {
        Some(Arc::new(ReportImporter))
    }

    fn builder(&self) -> Option<Arc<dyn CommandBuilder>> {
        Some(Arc::new(OutputCommandBuilder))
    }

    fn dialer(&self, device: &Device) -> Option<Arc<dyn Dialer>> {
        if device.address.is_empty() {
            tracing::warn!(device = %device.name, "bridge has no address");
            return None;
        }
        Some(Arc::new(TelnetDialer::new(&device.address, &self.config)))
    }

    fn events(&self, ctx: &DeviceContext) -> Option<DeviceEvents> {
        let name = {
            let device = directory::read(&ctx.device);
            if device.zones.is_empty() {
                tracing::debug!(device = %device.name, "no zones, nothing to monitor");
                return None;
            }
            device.name.clone()
        };
        let pool = ctx.pool.clone()?;
        if pool.config().size < 2 {
            tracing::warn!(
                device = %name,
                size = pool.config().size,
                "the event stream holds one connection; level requests will starve"
            );
        }

        let producer = StreamProducer::new(
            format!("lutron:{name}"),
            Arc::clone(&ctx.device),
            pool.clone(),
            Arc::clone(&ctx.publisher),
            Arc::new(OutputDecoder),
            ProducerConfig {
                lease_timeout: self.config.stream_lease_timeout(),
                scanner: protocol::scanner_config(),
                ..ProducerConfig::default()
            },
        );
        let consumer = ZoneReportConsumer::new(
            format!("lutron:{name}"),
            Arc::clone(&ctx.device),
            pool,
            self.config.request_lease_timeout(),
        );
        Some(DeviceEvents {
            producer: Some(Arc::new(producer)),
            consumer: Some(Arc::new(consumer)),
        })
    }
}

/// Register the Lutron bundle for all of its models.
///
/// # Errors
///
/// Returns [`HubError::Configuration`] when another extension already claims
/// one of the models.
pub fn register(registry: &mut ExtensionRegistry, config: LutronConfig) -> Result<(), HubError> {
    registry.register(MODELS, Arc::new(LutronBundle::new(config)))
}
