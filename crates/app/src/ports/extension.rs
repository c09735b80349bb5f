//! Extension port — the capability bundle a vendor integration provides for a
//! device model.
//!
//! A vendor crate implements [`Bundle`] once and registers it against the
//! model identifiers it supports (see
//! [`ExtensionRegistry`](crate::registry::ExtensionRegistry)). Every
//! capability is optional: `None` means "not supported for this model" and
//! callers must treat it as such, never as an error.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use homelink_domain::command::Command;
use homelink_domain::device::Device;
use homelink_domain::error::HubError;
use homelink_domain::event::{Event, EventKind};

use crate::connection_pool::ConnectionPool;
use crate::directory::SharedDevice;
use crate::ports::event_bus::EventPublisher;
use crate::ports::transport::Dialer;

/// Discovers devices of a model on the local network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Return device templates for `model`, ready to be imported.
    async fn devices(&self, model: &str) -> Result<Vec<Device>, HubError>;
}

/// Populates a device from a vendor export (integration report, config dump).
pub trait Importer: Send + Sync {
    /// Add the zones and sensors described by `source` to `device`.
    ///
    /// Returns how many zones were added.
    fn import(&self, device: &mut Device, source: &str) -> Result<usize, HubError>;
}

/// Translates abstract commands to the vendor wire format and back.
pub trait CommandBuilder: Send + Sync {
    /// Encode `command` as the bytes to write on a device connection.
    fn build(&self, command: &Command) -> Result<Bytes, HubError>;

    /// Decode wire bytes previously produced by [`build`](Self::build),
    /// resolving zone addresses against `device`.
    fn parse(&self, wire: &[u8], device: &Device) -> Result<Command, HubError>;
}

/// A long-running task that turns a device's byte stream into events.
#[async_trait]
pub trait EventProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Spawn the producing task. Calling `start` on a running producer is a
    /// no-op.
    fn start(&self);

    /// Signal the task to stop and wait until it has exited.
    ///
    /// Once this returns the producer publishes nothing more.
    async fn stop(&self);
}

/// Reacts to batches of events drained from its bus queue.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    fn name(&self) -> &str;

    /// Event kinds routed to this consumer.
    fn subscriptions(&self) -> &[EventKind];

    /// Handle one drained, already-coalesced batch in FIFO order.
    async fn consume(&self, batch: Vec<Event>);
}

/// Everything an extension needs to instantiate per-device event handling.
#[derive(Clone)]
pub struct DeviceContext {
    pub device: SharedDevice,
    /// `None` when the device has no pool configuration or the bundle has no
    /// dialer.
    pub pool: Option<ConnectionPool>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Producer and consumer pair for one device. Either may be absent.
#[derive(Default)]
pub struct DeviceEvents {
    pub producer: Option<Arc<dyn EventProducer>>,
    pub consumer: Option<Arc<dyn EventConsumer>>,
}

/// Capability bundle resolved from a device model identifier.
pub trait Bundle: Send + Sync {
    /// Name of the extension providing this bundle (e.g. `"lutron"`).
    fn extension(&self) -> &'static str;

    fn network(&self) -> Option<Arc<dyn Network>> {
        None
    }

    fn importer(&self) -> Option<Arc<dyn Importer>> {
        None
    }

    fn builder(&self) -> Option<Arc<dyn CommandBuilder>> {
        None
    }

    /// Dialer used to fill the device's connection pool.
    fn dialer(&self, _device: &Device) -> Option<Arc<dyn Dialer>> {
        None
    }

    /// Instantiate the producer/consumer pair for one device.
    fn events(&self, _ctx: &DeviceContext) -> Option<DeviceEvents> {
        None
    }
}
