//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the runtime and vendor integrations.
//! They are defined here (in `app`) so that both the runtime and the adapter
//! crates can depend on them without creating circular dependencies.

pub mod event_bus;
pub mod extension;
pub mod transport;

pub use event_bus::EventPublisher;
pub use extension::{
    Bundle, CommandBuilder, DeviceContext, DeviceEvents, EventConsumer, EventProducer, Importer,
    Network,
};
pub use transport::{Dialer, Transport};
