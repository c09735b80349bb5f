//! Application services — use-cases and the core event consumers.
//!
//! Services receive their collaborators (registry, bus, directory) through
//! their constructors; nothing here knows which vendor extensions exist.

pub mod device_monitor;
pub mod device_service;
pub mod integration_service;
pub mod level_tracker;
