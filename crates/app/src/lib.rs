//! # homelink-app
//!
//! Application layer — the device-integration runtime and **port
//! definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that vendor extensions implement:
//!   - `Bundle` — per-model capability set (`Network`, `Importer`,
//!     `CommandBuilder`, `EventProducer`, `EventConsumer`)
//!   - `Dialer` / `Transport` — opening byte streams to devices
//!   - `EventPublisher` — non-blocking event publication
//! - Provide the **runtime infrastructure** shared by every extension:
//!   - `ConnectionPool` — bounded, leased connections per device
//!   - `FrameScanner` — tokenizer for sentinel-tagged, CR-LF framed protocols
//!   - `InProcessEventBus` — per-consumer queues with request coalescing
//!   - `StreamProducer` — reconnecting producer over a pooled stream
//!   - `ExtensionRegistry` — model identifier to bundle lookup
//! - Provide **services**: device registration/import/discovery, starting and
//!   stopping integrations, command dispatch, and the core consumers that keep
//!   zone levels current
//!
//! ## Dependency rule
//! Depends on `homelink-domain` only (plus `tokio` for tasks, sync and I/O).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod backoff;
pub mod coalesce;
pub mod connection_pool;
pub mod directory;
pub mod event_bus;
pub mod frame_scanner;
pub mod ports;
pub mod producer;
pub mod registry;
pub mod services;

#[cfg(test)]
mod testing;
