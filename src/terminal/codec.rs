//! Line codec for assistant CLI output streams.
//!
//! Frames stdout into `\n`-terminated lines with a configurable maximum
//! length. Unlike [`tokio_util::codec::LinesCodec`], invalid UTF-8 is
//! replaced rather than rejected: diagnostic output from the CLI must still
//! reach the operator even when it is not clean text.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_switchboard::terminal::codec::StreamCodec;
//!
//! let lines = FramedRead::new(child_stdout, StreamCodec::new());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted by the codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Lossy UTF-8 line decoder with an upper bound on line length.
///
/// A line longer than the limit is truncated to the limit and the remainder
/// is discarded up to the next `\n`. The decoder never fails on content:
/// [`tokio_util::codec::FramedRead`] ends the stream after a decode error,
/// which would look like the CLI closing its output.
#[derive(Debug)]
pub struct StreamCodec {
    max_length: usize,
    /// Bytes already scanned for a newline in the current buffer.
    next_index: usize,
    /// Set while skipping the tail of an over-long line.
    discarding: bool,
}

impl StreamCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    src.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(src.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(idx)) if idx > self.max_length => {
                    warn!(
                        max_length = self.max_length,
                        "output line too long, truncating"
                    );
                    self.next_index = 0;
                    let line = src.split_to(idx + 1);
                    return Ok(Some(decode_line(&line[..self.max_length])));
                }
                (false, Some(idx)) => {
                    self.next_index = 0;
                    let line = src.split_to(idx + 1);
                    return Ok(Some(decode_line(&line[..idx])));
                }
                (false, None) if src.len() > self.max_length => {
                    warn!(
                        max_length = self.max_length,
                        "output line too long, truncating"
                    );
                    let head = src.split_to(self.max_length);
                    self.discarding = true;
                    self.next_index = 0;
                    return Ok(Some(decode_line(&head)));
                }
                (false, None) => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(decode_line(&rest)))
    }
}

/// Convert raw line bytes to text, dropping a trailing `\r`.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
