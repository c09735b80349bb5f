//! Telnet dialer — TCP connection plus the bridge's integration login.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

use homelink_app::ports::transport::{Dialer, Transport};
use homelink_domain::error::HubError;

use crate::config::LutronConfig;
use crate::error::LutronError;

const LOGIN_PROMPT: &str = "login:";
const PASSWORD_PROMPT: &str = "password:";
const READY_PROMPT: &str = "GNET>";
/// Bytes read while waiting for one prompt before giving up.
const MAX_PROMPT_WAIT: usize = 4096;

/// Opens logged-in integration sessions to one bridge.
#[derive(Debug, Clone)]
pub struct TelnetDialer {
    address: String,
    login: String,
    password: String,
    connect_timeout: Duration,
}

impl TelnetDialer {
    /// Dialer for `address`, which may omit the port.
    #[must_use]
    pub fn new(address: &str, config: &LutronConfig) -> Self {
        let address = if address.contains(':') {
            address.to_string()
        } else {
            format!("{address}:{}", config.default_port)
        };
        Self {
            address,
            login: config.login.clone(),
            password: config.password.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<Session, LutronError> {
        let mut stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let pending = self.login(&mut stream).await?;
        Ok(Session { pending, stream })
    }

    /// Returns whatever the bridge sent after the ready prompt.
    async fn login<S>(&self, stream: &mut S) -> Result<Bytes, LutronError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        expect(stream, LOGIN_PROMPT, None).await?;
        send_line(stream, &self.login).await?;
        expect(stream, PASSWORD_PROMPT, None).await?;
        send_line(stream, &self.password).await?;
        expect(stream, READY_PROMPT, Some(LOGIN_PROMPT))
            .await
            .map_err(|err| match err {
                LutronError::Handshake(LOGIN_PROMPT) => {
                    LutronError::LoginRejected(self.login.clone())
                }
                other => other,
            })
    }
}

#[async_trait]
impl Dialer for TelnetDialer {
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    async fn dial(&self) -> Result<Box<dyn Transport>, HubError> {
        let session = tokio::time::timeout(self.connect_timeout, self.connect())
            .await
            .map_err(|_| HubError::Timeout(self.connect_timeout))??;
        tracing::debug!(pending = session.pending.len(), "integration session opened");
        Ok(Box::new(session))
    }
}

/// A logged-in socket. Reads drain the bytes that arrived with the ready
/// prompt before touching the socket.
struct Session {
    pending: Bytes,
    stream: TcpStream,
}

impl AsyncRead for Session {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pending.is_empty() {
            return Pin::new(&mut self.stream).poll_read(cx, buf);
        }
        let n = self.pending.len().min(buf.remaining());
        let head = self.pending.split_to(n);
        buf.put_slice(&head);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Session {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

async fn send_line<S>(stream: &mut S, line: &str) -> Result<(), LutronError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Read until `prompt` shows up and return the bytes read past it. Fails
/// with `Handshake(rejected)` if the `rejected` prompt shows up first.
async fn expect<S>(
    stream: &mut S,
    prompt: &'static str,
    rejected: Option<&'static str>,
) -> Result<Bytes, LutronError>
where
    S: AsyncRead + Unpin,
{
    let mut seen = Vec::with_capacity(64);
    let mut chunk = [0_u8; 256];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(LutronError::Handshake(prompt));
        }
        seen.extend_from_slice(&chunk[..n]);
        if let Some(at) = find(&seen, prompt) {
            return Ok(Bytes::copy_from_slice(&seen[at + prompt.len()..]));
        }
        if let Some(rejected) = rejected.filter(|r| find(&seen, r).is_some()) {
            return Err(LutronError::Handshake(rejected));
        }
        if seen.len() > MAX_PROMPT_WAIT {
            return Err(LutronError::Handshake(prompt));
        }
    }
}

fn find(haystack: &[u8], needle: &str) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
