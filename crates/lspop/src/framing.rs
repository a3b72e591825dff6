//! `Content-Length` stream framing.
//!
//! Language servers speak JSON framed by HTTP-like headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! Server output arrives in arbitrary chunks. [`MessageFramer`] buffers them and hands back every
//! complete body as soon as it is available.

use crate::error::ClientError;
use lspop_json::Value;
use tracing::warn;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Reassembles framed messages from a byte stream.
///
/// After every [`MessageFramer::feed`] the internal buffer is either empty or holds the prefix
/// of a message whose header or body is still incomplete.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buffer: Vec<u8>,
}

impl MessageFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and decode every complete message now buffered, in arrival order.
    ///
    /// Bodies that are not valid UTF-8 JSON are dropped with a warning; framing continues with
    /// the next message.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(body) = self.next_body() {
            match decode_body(&body) {
                Ok(value) => messages.push(value),
                Err(err) => warn!("dropping message: {err}"),
            }
        }
        messages
    }

    /// Remove and return the next complete raw body, if one is buffered.
    ///
    /// A header block that carries no usable `Content-Length` is discarded so the stream can
    /// resynchronise on the next header.
    pub fn next_body(&mut self) -> Option<Vec<u8>> {
        loop {
            let header_end = find(&self.buffer, HEADER_TERMINATOR)?;
            let body_start = header_end + HEADER_TERMINATOR.len();

            let Some(length) = content_length(&self.buffer[..header_end]) else {
                warn!(
                    "discarding header block without Content-Length: {:?}",
                    String::from_utf8_lossy(&self.buffer[..header_end])
                );
                self.buffer.drain(..body_start);
                continue;
            };

            let body_end = body_start.checked_add(length)?;
            if self.buffer.len() < body_end {
                return None;
            }

            let body = self.buffer[body_start..body_end].to_vec();
            self.buffer.drain(..body_end);
            return Some(body);
        }
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received message.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Frame `body` with a `Content-Length` header counting its bytes.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Encode `message` as JSON and frame it.
pub fn encode_message(message: &Value) -> Vec<u8> {
    encode_frame(lspop_json::to_string(message).as_bytes())
}

/// Decode one framed body into a JSON value.
pub fn decode_body(body: &[u8]) -> Result<Value, ClientError> {
    Ok(lspop_json::from_slice(body)?)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Locate `Content-Length:` anywhere in the header block (ASCII case-insensitive) and parse the
/// decimal digits following it.
fn content_length(header: &[u8]) -> Option<usize> {
    let start = header
        .windows(CONTENT_LENGTH.len())
        .position(|window| window.eq_ignore_ascii_case(CONTENT_LENGTH))?
        + CONTENT_LENGTH.len();

    let rest = &header[start..];
    let digits_start = rest.iter().position(|b| *b != b' ' && *b != b'\t')?;
    let digits = &rest[digits_start..];
    let digits_len = digits.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }

    std::str::from_utf8(&digits[..digits_len])
        .ok()?
        .parse()
        .ok()
}
