//! Line codec for newline-delimited JSON framing.
//!
//! # Frame Format
//!
//! Each frame is a single UTF-8 JSON document followed by `\n`. A trailing
//! `\r` is tolerated on input. Embedded newlines never appear because JSON
//! strings escape them.
//!
//! This is the framing used by MCP's stdio transport.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Line terminator.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Maximum frame size (16 MB), delimiter excluded.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for encoding and decoding newline-delimited JSON frames.
#[derive(Debug, Clone, Copy)]
pub struct LineCodec {
    max_frame_size: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a codec with the default size limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Maximum payload size accepted by this codec.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialize `value` into a single line, delimiter included.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(value)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

        if bytes.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: self.max_frame_size,
            });
        }

        bytes.push(FRAME_DELIMITER);
        Ok(bytes)
    }

    /// Decode one line. The delimiter (and an optional `\r`) may be present.
    ///
    /// Returns `Ok(None)` for blank lines so callers can skip keep-alives.
    pub fn decode<T: DeserializeOwned>(&self, line: &[u8]) -> Result<Option<T>> {
        let line = trim_delimiter(line);

        if line.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: line.len(),
                max: self.max_frame_size,
            });
        }

        let text = std::str::from_utf8(line)?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value = serde_json::from_str(text)?;
        Ok(Some(value))
    }
}

fn trim_delimiter(mut line: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = line {
        line = rest;
    }
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}
