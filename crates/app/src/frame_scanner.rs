//! Frame scanner for line-oriented, sentinel-tagged device protocols.
//!
//! A frame is a sentinel byte, a keyword, a comma, comma-separated fields and
//! a terminating `\r\n`, e.g. `~OUTPUT,3,1,75.00\r\n`. Bytes are appended as
//! they arrive; [`FrameScanner::next_frame`] yields complete frames and
//! returns `None` when it needs more input. Bytes that cannot start a frame
//! (prompts, echoes, noise) are skipped over.

use bytes::{Buf, Bytes, BytesMut};
use regex::bytes::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};

use homelink_domain::error::HubError;

const READ_CHUNK: usize = 1024;

/// Shape of the frames to recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Bytes that may open a frame.
    pub sentinels: String,
    /// Keywords accepted after the sentinel. Empty accepts any upper-case word.
    pub keywords: Vec<String>,
    /// Unmatched bytes kept before the oldest are dropped.
    pub max_retained: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            sentinels: "~#?".to_string(),
            keywords: Vec::new(),
            max_retained: 4096,
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    fn pattern(&self) -> String {
        let sentinels: String = self
            .sentinels
            .chars()
            .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
            .collect();
        let keywords = if self.keywords.is_empty() {
            "[A-Z]+".to_string()
        } else {
            self.keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|")
        };
        // Fields never contain a sentinel, so a frame cut short restarts at
        // the next tag instead of swallowing it.
        format!(r"(?-u)[{sentinels}](?:{keywords}),[^\r\n{sentinels}]*\r\n")
    }
}

/// Incremental frame tokenizer over an append-only buffer.
#[derive(Debug)]
pub struct FrameScanner {
    pattern: Regex,
    sentinels: Vec<u8>,
    buf: BytesMut,
    max_retained: usize,
}

impl FrameScanner {
    /// # Errors
    ///
    /// Returns [`HubError::Adapter`] when the configuration does not yield a
    /// valid pattern.
    pub fn new(config: &ScannerConfig) -> Result<Self, HubError> {
        let pattern = Regex::new(&config.pattern()).map_err(|err| HubError::Adapter(err.into()))?;
        Ok(Self {
            pattern,
            sentinels: config.sentinels.bytes().collect(),
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_retained: config.max_retained,
        })
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently held back waiting for a frame to complete.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget everything buffered, e.g. after reconnecting.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Extract the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if let Some(found) = self.pattern.find(&self.buf) {
            let (start, end) = (found.start(), found.end());
            let mut consumed = self.buf.split_to(end);
            consumed.advance(start);
            return Some(consumed.freeze());
        }
        self.shed();
        None
    }

    /// Keep the unmatched buffer under `max_retained`: drop everything before
    /// the last sentinel, or everything when that tail is still too long.
    fn shed(&mut self) {
        if self.buf.len() <= self.max_retained {
            return;
        }
        let tail_start = self
            .buf
            .iter()
            .rposition(|b| self.sentinels.contains(b))
            .filter(|&pos| self.buf.len() - pos <= self.max_retained);
        let dropped = match tail_start {
            Some(pos) => {
                self.buf.advance(pos);
                pos
            }
            None => {
                let len = self.buf.len();
                self.buf.clear();
                len
            }
        };
        tracing::debug!(dropped, "scanner dropped unmatched bytes");
    }

    /// Read from `reader` until a complete frame is available.
    ///
    /// Cancel-safe: bytes read before cancellation stay buffered.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::StreamClosed`] on end-of-stream and
    /// [`HubError::Transport`] on read failure.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Bytes, HubError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.next_frame() {
                return Ok(frame);
            }
            self.buf.reserve(READ_CHUNK);
            if reader.read_buf(&mut self.buf).await? == 0 {
                return Err(HubError::StreamClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn scanner() -> FrameScanner {
        FrameScanner::new(&ScannerConfig::default().with_keywords(["OUTPUT", "DEVICE"])).unwrap()
    }

    const LEVEL_REPORT: &[u8] = b"~OUTPUT,3,1,75.00\r\n";

    #[test]
    fn should_yield_same_frame_byte_by_byte_and_in_one_chunk() {
        let mut whole = scanner();
        whole.push(LEVEL_REPORT);
        let expected = whole.next_frame().unwrap();
        assert!(whole.next_frame().is_none());

        let mut trickle = scanner();
        let mut frames = Vec::new();
        for byte in LEVEL_REPORT {
            trickle.push(&[*byte]);
            frames.extend(trickle.next_frame());
        }
        assert_eq!(frames, vec![expected.clone()]);
        assert_eq!(&expected[..], LEVEL_REPORT);
    }

    #[test]
    fn should_skip_prompt_before_frame() {
        let mut scanner = scanner();
        scanner.push(b"GNET> ~OUTPUT,3,1,0.00\r\n");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"~OUTPUT,3,1,0.00\r\n");
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn should_yield_frames_in_order_from_one_chunk() {
        let mut scanner = scanner();
        scanner.push(b"~OUTPUT,3,1,10.00\r\n~DEVICE,5,2,3\r\n~OUTPUT,4,1,20");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"~OUTPUT,3,1,10.00\r\n");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"~DEVICE,5,2,3\r\n");
        assert!(scanner.next_frame().is_none());

        scanner.push(b".00\r\n");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"~OUTPUT,4,1,20.00\r\n");
    }

    #[test]
    fn should_resync_on_tag_after_truncated_frame() {
        let mut scanner = scanner();
        scanner.push(b"~OUTPUT,3,1,7~OUTPUT,4,1,50.00\r\n");

        assert_eq!(
            scanner.next_frame().as_deref(),
            Some(&b"~OUTPUT,4,1,50.00\r\n"[..])
        );
        assert!(scanner.next_frame().is_none());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn should_ignore_unknown_keywords() {
        let mut scanner = scanner();
        scanner.push(b"~ERROR,6\r\n");
        assert!(scanner.next_frame().is_none());
    }

    #[test]
    fn should_keep_tail_from_last_sentinel_when_over_cap() {
        let config = ScannerConfig {
            max_retained: 16,
            ..ScannerConfig::default().with_keywords(["OUTPUT"])
        };
        let mut scanner = FrameScanner::new(&config).unwrap();
        scanner.push(b"noise noise noise ~OUTPUT,3");
        assert!(scanner.next_frame().is_none());
        assert_eq!(scanner.buffered(), b"~OUTPUT,3".len());

        scanner.push(b",1,5.00\r\n");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"~OUTPUT,3,1,5.00\r\n");
    }

    #[test]
    fn should_drop_everything_when_tail_is_over_cap() {
        let config = ScannerConfig {
            max_retained: 8,
            ..ScannerConfig::default()
        };
        let mut scanner = FrameScanner::new(&config).unwrap();
        scanner.push(b"~OUTPUT,3,1,75.0");
        assert!(scanner.next_frame().is_none());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn should_accept_any_keyword_when_none_configured() {
        let mut scanner = FrameScanner::new(&ScannerConfig::default()).unwrap();
        scanner.push(b"?SYSTEM,1\r\n");
        assert_eq!(&scanner.next_frame().unwrap()[..], b"?SYSTEM,1\r\n");
    }

    #[tokio::test]
    async fn should_read_frame_from_stream() {
        let (mut device, mut hub) = tokio::io::duplex(64);
        let mut scanner = scanner();

        device.write_all(b"~OUTPUT,3,1,").await.unwrap();
        let writer = tokio::spawn(async move {
            device.write_all(b"75.00\r\n").await.unwrap();
            device
        });

        let frame = scanner.read_frame(&mut hub).await.unwrap();
        assert_eq!(&frame[..], LEVEL_REPORT);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn should_surface_end_of_stream() {
        let (device, mut hub) = tokio::io::duplex(64);
        drop(device);
        let mut scanner = scanner();
        assert!(matches!(
            scanner.read_frame(&mut hub).await,
            Err(HubError::StreamClosed)
        ));
    }
}
