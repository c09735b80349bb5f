//! # homelinkd — homelink daemon
//!
//! Composition root that wires the runtime, the vendor extensions and the
//! configured devices together.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Register vendor extensions in the extension registry
//! - Construct the event bus and the core consumers
//! - Register (or import) the configured devices
//! - Start every device integration, stop them on shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

pub mod config;
pub mod runtime;
