//! Session error type.

use thiserror::Error;

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
///
/// Timeouts and process exits during a command are not errors; they are
/// reported as annotations on a successful [`CommandOutput`](super::CommandOutput).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session was not found.
    #[error("No active debugger session with ID: {0}")]
    NotFound(SessionId),

    /// The debugger could not be spawned or did not become ready.
    #[error("failed to start debugger: {0}")]
    StartFailed(String),

    /// The command text cannot be sent as a single debugger line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Failed to write a command to the debugger's stdin.
    #[error("failed to write to debugger: {0}")]
    WriteFailed(String),

    /// The debugger process or one of its streams failed.
    #[error("debugger process error: {0}")]
    ProcessError(String),

    /// A session with this id is already registered.
    #[error("session already exists: {0}")]
    AlreadyExists(SessionId),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
