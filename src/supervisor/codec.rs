//! Best-effort line codec for child process output.
//!
//! The child server's text encoding is locale-dependent and not a contract
//! we control, so decoding must never fail the monitor loop: every line is
//! decoded lossily, replacing invalid byte sequences with U+FFFD. A maximum
//! line length protects the supervisor from an unterminated stream
//! allocating unbounded memory; an over-long line is flushed as-is and
//! draining continues.
//!
//! # Usage
//!
//! Use [`OutputLineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the child's stdout or stderr.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Maximum bytes buffered for a single line: 64 KiB.
///
/// A line longer than this is emitted in [`MAX_LINE_BYTES`]-sized chunks
/// instead of being rejected — output draining is best-effort and must not
/// stop on malformed input.
pub const MAX_LINE_BYTES: usize = 65_536;

/// Lossy, non-failing line decoder for combined child output.
#[derive(Debug, Default)]
pub struct OutputLineCodec;

impl OutputLineCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Decode `buf` into a string as-is.
fn decode_lossy(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

/// Decode a newline-terminated line, dropping a trailing `\r` left by CRLF
/// line endings. Chunks that were not newline-terminated keep every byte;
/// a `\r` there belongs to the data.
fn decode_line(buf: &[u8]) -> String {
    let trimmed = buf.strip_suffix(b"\r").unwrap_or(buf);
    decode_lossy(trimmed)
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Only scan the first MAX_LINE_BYTES so an over-long line is
        // chunked instead of buffered whole.
        let search_limit = src.len().min(MAX_LINE_BYTES);
        if let Some(pos) = src[..search_limit].iter().position(|b| *b == b'\n') {
            let line = src.split_to(pos + 1);
            return Ok(Some(decode_line(&line[..line.len() - 1])));
        }

        if src.len() >= MAX_LINE_BYTES {
            // Unterminated over-long line: flush what we have as one chunk.
            let chunk = src.split_to(MAX_LINE_BYTES);
            return Ok(Some(decode_lossy(&chunk)));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            Ok(None)
        } else {
            let rest = src.split_to(src.len());
            Ok(Some(decode_lossy(&rest)))
        }
    }
}
