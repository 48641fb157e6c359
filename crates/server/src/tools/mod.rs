//! Debugger tools exposed over MCP.
//!
//! - [`catalog`]: tool names, descriptions and argument schemas
//! - [`params`]: typed tool arguments
//! - [`commands`]: LLDB command builders
//! - [`handler`]: the tool handler driving the session manager

pub mod catalog;
pub mod commands;
pub mod handler;
pub mod params;

use thiserror::Error;

use crate::session::SessionError;

pub use catalog::{all_tools, DebuggerTool};
pub use handler::DebuggerToolHandler;

/// Errors raised while running a tool.
///
/// These never become JSON-RPC errors; the handler turns them into tool
/// results with `isError` set.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The session layer failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}
