//! Decoding of streamed `/completion` bodies.
//!
//! The server emits one JSON object per line, optionally wrapped as an SSE
//! `data:` field. Network reads do not respect line boundaries, so bytes are
//! buffered in a [`LineDecoder`] until a full line is available.

use probe_common::{ProbeError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// One decoded line of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub is_final: bool,
}

#[derive(Deserialize)]
struct WireChunk {
    content: Option<String>,
    #[serde(default)]
    stop: bool,
}

/// Longest unterminated line accepted before the stream is rejected.
pub const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    // bytes of `buf` already known to hold no newline
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes the next complete line, terminator included, leaving later bytes undecoded.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let end = self.scanned + pos;
                self.scanned = 0;
                Ok(Some(self.buf.drain(..=end).collect()))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buf.len() > MAX_LINE_BYTES {
                    return Err(ProbeError::Protocol(format!("stream line exceeds {} bytes", MAX_LINE_BYTES)));
                }
                Ok(None)
            }
        }
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.buf.is_empty() { None } else { Some(std::mem::take(&mut self.buf)) }
    }
}

/// Converts a raw line to text without its terminator.
pub fn decode_line(bytes: &[u8]) -> Result<&str> {
    let line = std::str::from_utf8(bytes).map_err(|e| ProbeError::Protocol(format!("stream line is not utf-8: {}", e)))?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]))
}

/// Parses one line; blank lines (SSE separators) yield `None`.
pub fn parse_chunk(line: &str) -> Result<Option<StreamChunk>> {
    let line = line.trim();
    let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if payload.is_empty() {
        return Ok(None);
    }
    let wire: WireChunk = decode_object(payload)?;
    Ok(Some(StreamChunk { content: wire.content, is_final: wire.stop }))
}

/// Decodes `payload` as `T`, requiring a top-level JSON object.
pub(crate) fn decode_object<T: DeserializeOwned>(payload: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| ProbeError::Protocol(format!("undecodable JSON ({}): {}", e, excerpt(payload))))?;
    if !value.is_object() {
        return Err(ProbeError::Protocol(format!("expected a JSON object: {}", excerpt(payload))));
    }
    serde_json::from_value(value).map_err(|e| ProbeError::Protocol(format!("unexpected shape ({}): {}", e, excerpt(payload))))
}

fn excerpt(payload: &str) -> String {
    const MAX: usize = 80;
    match payload.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &payload[..cut]),
        None => payload.to_string(),
    }
}
