//! Lutron adapter error types.

use homelink_domain::error::HubError;

/// Errors specific to the Lutron adapter.
#[derive(Debug, thiserror::Error)]
pub enum LutronError {
    /// The bridge asked for the login again after the password was sent.
    #[error("bridge rejected login {0:?}")]
    LoginRejected(String),

    /// The bridge closed the connection or sent too much before prompting.
    #[error("unexpected reply while waiting for {0:?}")]
    Handshake(&'static str),

    /// Socket-level failure.
    #[error("bridge I/O error")]
    Io(#[source] std::io::Error),

    /// The integration report is not valid JSON or lacks the expected layout.
    #[error("failed to parse integration report")]
    Report(#[source] serde_json::Error),

    /// A domain-level error (validation, decoding, etc.).
    #[error("domain error")]
    Domain(#[source] HubError),
}

impl LutronError {
    /// Convert into a [`HubError`] for propagation across port boundaries.
    pub fn into_domain(self) -> HubError {
        match self {
            Self::Domain(err) => err,
            Self::Io(err) => HubError::Transport(err),
            other => HubError::Adapter(Box::new(other)),
        }
    }
}

impl From<LutronError> for HubError {
    fn from(err: LutronError) -> Self {
        err.into_domain()
    }
}

impl From<std::io::Error> for LutronError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
