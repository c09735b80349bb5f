//! # homelink-domain
//!
//! Pure domain model for the homelink device-integration runtime.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers and error conventions
//! - Define **Devices** (physical units integrated through one vendor extension)
//! - Define **Zones** (controllable outputs such as dimmer channels) and
//!   **Sensors** (read-only inputs) owned by a device
//! - Define **Events** (the tagged messages carried by the event bus)
//! - Define **Commands** (abstract intents turned into wire bytes by a vendor
//!   command builder)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod command;
pub mod device;
pub mod event;
pub mod sensor;
pub mod zone;
