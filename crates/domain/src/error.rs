//! Common error types used across the workspace.
//!
//! [`HubError`] is the error every port and service returns. Each layer
//! defines its own typed errors and converts into it via `#[from]` or an
//! explicit `into_domain()`.

use std::time::Duration;

/// Top-level error for the integration runtime.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced device, zone or sensor does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A protocol frame could not be turned into an event or command.
    #[error("failed to decode frame")]
    Decode(#[from] DecodeError),

    /// No connection became available before the lease deadline.
    #[error("no connection available within {0:?}")]
    Timeout(Duration),

    /// The device model has no extension, or the extension lacks a capability.
    #[error("unsupported model")]
    Unsupported(#[from] UnsupportedError),

    /// The byte stream reached end-of-file.
    #[error("stream closed by peer")]
    StreamClosed,

    /// Transport-level I/O failure.
    #[error("transport error")]
    Transport(#[from] std::io::Error),

    /// The runtime was wired inconsistently (e.g. two extensions claim a model).
    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    /// An adapter-specific failure that has no domain counterpart.
    #[error("adapter error")]
    Adapter(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HubError {
    /// Whether the error is the lease [`Timeout`](Self::Timeout).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Invariant violations detected when building or mutating domain objects.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("model identifier must not be empty")]
    EmptyModel,

    #[error("address must not be empty")]
    EmptyAddress,

    #[error("zone address {0:?} is already used on this device")]
    DuplicateZoneAddress(String),

    #[error("level {0} is outside 0..=100")]
    LevelOutOfRange(f32),

    #[error("connection pool size must be at least 1")]
    EmptyPool,
}

/// A lookup by identifier found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Reasons a single frame is dropped.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame does not match the expected layout")]
    Malformed,

    #[error("non-numeric level {0:?}")]
    InvalidLevel(String),

    #[error("no zone with address {0:?}")]
    UnknownAddress(String),

    #[error("unsupported command id {0:?}")]
    UnknownCommand(String),
}

/// A model identifier resolved to nothing, or to a bundle without the
/// requested capability.
#[derive(Debug, thiserror::Error)]
#[error("model {model:?} does not support {capability}")]
pub struct UnsupportedError {
    pub model: String,
    pub capability: &'static str,
}

/// Wiring mistakes detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("model {model:?} is claimed by both {existing} and {extension}")]
    DuplicateModel {
        model: String,
        existing: &'static str,
        extension: &'static str,
    },

    #[error("device {0} has no connection pool configuration")]
    MissingPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Zone",
            id: "42".to_string(),
        };
        assert_eq!(err.to_string(), "Zone 42 not found");
    }

    #[test]
    fn should_convert_validation_error_into_hub_error() {
        let err: HubError = ValidationError::EmptyName.into();
        assert!(matches!(err, HubError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn should_report_timeout() {
        let err = HubError::Timeout(Duration::from_secs(10));
        assert!(err.is_timeout());
        assert!(!HubError::StreamClosed.is_timeout());
    }

    #[test]
    fn should_display_unsupported_capability() {
        let err = UnsupportedError {
            model: "acme-1".to_string(),
            capability: "events",
        };
        assert_eq!(err.to_string(), "model \"acme-1\" does not support events");
    }

    #[test]
    fn should_display_duplicate_model_claim() {
        let err = ConfigurationError::DuplicateModel {
            model: "l-bdgpro2-wh".to_string(),
            existing: "lutron",
            extension: "other",
        };
        assert_eq!(
            err.to_string(),
            "model \"l-bdgpro2-wh\" is claimed by both lutron and other"
        );
    }
}
