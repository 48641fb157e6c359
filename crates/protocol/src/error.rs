//! Errors raised while reading or writing MCP messages.

use std::io;

use thiserror::Error;

/// Failures on the JSON-RPC line channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A value could not be turned into JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A line was not valid JSON, or not the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Valid JSON, but not a JSON-RPC 2.0 message.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A line longer than the codec accepts.
    #[error("line of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The peer went away (broken pipe, closed stream).
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Other I/O failure on stdin/stdout.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Io => ProtocolError::Io(err.to_string()),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => ProtocolError::Deserialization(err.to_string()),
        }
    }
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(err: std::str::Utf8Error) -> Self {
        ProtocolError::InvalidUtf8(err.to_string())
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
                ProtocolError::ChannelClosed(err.to_string())
            }
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}

impl ProtocolError {
    /// Whether the peer closed the channel.
    pub fn is_closed(&self) -> bool {
        matches!(self, ProtocolError::ChannelClosed(_))
    }
}
