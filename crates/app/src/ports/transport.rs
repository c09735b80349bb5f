//! Transport port — byte streams to physical devices and the dialers that
//! open them.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use homelink_domain::error::HubError;

/// A bidirectional byte stream to a device (TCP socket, serial line, …).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Opens new transports to one device.
///
/// Dialers own vendor handshakes (e.g. a telnet login), so the pool only
/// ever sees ready-to-use streams.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open and prepare a fresh connection.
    async fn dial(&self) -> Result<Box<dyn Transport>, HubError>;
}
