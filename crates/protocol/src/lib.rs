//! # lldb-mcp Protocol Library
//!
//! Wire types for the lldb-mcp server.
//!
//! ## Overview
//!
//! The server speaks the Model Context Protocol over stdio. This crate
//! provides:
//!
//! - **JSON-RPC Envelope**: Requests, notifications, responses and error codes
//! - **MCP Payloads**: Tool definitions and tool call results
//! - **Line Codec**: Newline-delimited JSON framing with a size limit
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        MCP payloads (tools/*)           │
//! ├─────────────────────────────────────────┤
//! │          JSON-RPC 2.0 envelope          │
//! ├─────────────────────────────────────────┤
//! │       Newline-delimited JSON lines      │
//! ├─────────────────────────────────────────┤
//! │            stdin / stdout               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{LineCodec, Request, Response, ToolResult};
//!
//! let codec = LineCodec::new();
//! let request: Request = codec
//!     .decode(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
//!     .unwrap()
//!     .unwrap();
//!
//! let result = serde_json::to_value(ToolResult::text("pong")).unwrap();
//! let response = Response::success(request.id.unwrap(), result);
//! let line = codec.encode(&response).unwrap();
//! assert_eq!(line.last(), Some(&b'\n'));
//! ```
//!
//! ## Modules
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 envelope and error codes
//! - [`mcp`]: MCP tool types
//! - [`framing`]: Line codec
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod jsonrpc;
pub mod mcp;

pub use error::{ProtocolError, Result};
pub use framing::{LineCodec, FRAME_DELIMITER, MAX_FRAME_SIZE};
pub use jsonrpc::{ErrorObject, Request, RequestId, Response, RpcError, JSONRPC_VERSION};
pub use mcp::{
    initialize_result, ServerInfo, ToolContent, ToolDefinition, ToolResult, MCP_PROTOCOL_VERSION,
};
