//! Framing and codec for newline-delimited JSON messages
//!
//! Each connection owns one [`LineCodec`] holding its partial-read buffer;
//! the codec is created with the connection and destroyed with it, so no
//! process-wide buffer map keyed by a reusable handle exists.

use bytes::BytesMut;

use super::messages::{ClientMessage, ServerMessage};
use crate::error::{GameError, Result};

/// Default cap on a single inbound line (including the terminator)
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental decoder for newline-delimited input
///
/// Feed raw socket reads in with [`feed`](LineCodec::feed), then drain
/// complete lines with [`next_line`](LineCodec::next_line) until it returns
/// `Ok(None)`.
#[derive(Debug)]
pub struct LineCodec {
    buf: BytesMut,
    max_line: usize,
}

impl LineCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_line,
        }
    }

    /// Append raw bytes read from the connection
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete line, without its terminator
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. Errors when the
    /// buffer grows past the line limit without a terminator; the connection
    /// should be dropped at that point.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                let mut line = self.buf.split_to(idx + 1);
                line.truncate(idx);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                if self.buf.len() > self.max_line {
                    Err(GameError::protocol(format!(
                        "Line too long: {} bytes buffered (max: {})",
                        self.buf.len(),
                        self.max_line
                    )))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode an outbound message as one newline-terminated JSON line
pub fn encode(msg: &ServerMessage) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec(msg)?;
    data.push(b'\n');
    Ok(data)
}

/// Decode one inbound line into a client message
///
/// Distinguishes unparseable JSON from a parseable object of an unknown or
/// malformed type; both are recoverable protocol errors.
pub fn decode(line: &str) -> Result<ClientMessage> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|_| GameError::protocol("Bad message format (invalid JSON)."))?;

    serde_json::from_value(value.clone()).map_err(|_| {
        match value.get("type").and_then(|t| t.as_str()) {
            Some(kind) => GameError::protocol(format!(
                "Unknown or malformed type {}. Use HELLO/LIST/CREATE/JOIN/MOVE/LEAVE/QUIT.",
                kind
            )),
            None => GameError::protocol("Bad message format (missing type)."),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_lines_across_chunk_boundaries() {
        let mut codec = LineCodec::new();
        codec.feed(b"{\"type\":\"HEL");
        assert_eq!(codec.next_line().unwrap(), None);
        codec.feed(b"LO\",\"name\":\"alice\"}\n{\"type\":");
        let line = codec.next_line().unwrap().unwrap();
        assert_eq!(line, r#"{"type":"HELLO","name":"alice"}"#);
        assert_eq!(codec.next_line().unwrap(), None);
        codec.feed(b"\"LIST\"}\n");
        assert_eq!(codec.next_line().unwrap().unwrap(), r#"{"type":"LIST"}"#);
    }

    #[test]
    fn drains_multiple_lines_from_one_feed() {
        let mut codec = LineCodec::new();
        codec.feed(b"one\ntwo\r\nthree\n");
        assert_eq!(codec.next_line().unwrap().unwrap(), "one");
        assert_eq!(codec.next_line().unwrap().unwrap(), "two");
        assert_eq!(codec.next_line().unwrap().unwrap(), "three");
        assert_eq!(codec.next_line().unwrap(), None);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn oversized_line_is_an_error() {
        let mut codec = LineCodec::with_limit(16);
        codec.feed(&[b'x'; 32]);
        assert!(codec.next_line().is_err());
    }

    #[test]
    fn encode_terminates_with_newline() {
        let data = encode(&ServerMessage::ok("Bye")).unwrap();
        assert_eq!(data.last(), Some(&b'\n'));
        assert!(!data[..data.len() - 1].contains(&b'\n'));
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode("not json at all").unwrap_err();
        assert_eq!(err.message(), "Bad message format (invalid JSON).");
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode(r#"{"type":"DANCE"}"#).unwrap_err();
        assert!(err.message().contains("DANCE"));
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = decode(r#"{"name":"alice"}"#).unwrap_err();
        assert!(err.message().contains("missing type"));
    }
}
