//! # lldb-mcp Server Library
//!
//! This crate drives interactive LLDB sessions on behalf of an MCP client.
//!
//! ## Overview
//!
//! Each session is a child `lldb` process spoken to over its standard
//! streams. The library provides:
//!
//! - **Session Engine**: Spawn debuggers, wait for their prompt, run one
//!   command at a time and collect the response
//! - **Session Registry**: Concurrent id to session map with creation order
//! - **Debugger Tools**: The `lldb_*` tool catalog and its command mapping
//! - **MCP Server**: JSON-RPC over stdin/stdout
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 MCP Server (stdin / stdout)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Debugger Tool Handler                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                Session Lifecycle Manager                     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │   Launcher   │  │   Executor   │  │     Registry     │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! ├─────────────────────────────────────────────────────────────┤
//! │               lldb child processes (piped)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lldb_mcp::session::{SessionLifecycleManager, SessionRegistry, StartOptions};
//! use lldb_mcp::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let manager = SessionLifecycleManager::new(
//!         config.manager_config(),
//!         Arc::new(SessionRegistry::new()),
//!     );
//!
//!     let started = manager.start(StartOptions::default()).await?;
//!     let output = manager.execute(&started.id, "breakpoint set --name main").await?;
//!     println!("{}", output.render());
//!
//!     manager.terminate(&started.id).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Debugger process sessions
//! - [`tools`]: MCP tool catalog and handler
//! - [`mcp`]: MCP server loop
//! - [`signal`]: SIGINT/SIGTERM handling

pub mod config;
pub mod mcp;
pub mod session;
pub mod signal;
pub mod tools;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;

pub use session::{
    CommandOutput, SessionError, SessionId, SessionLifecycleManager, SessionRegistry,
    StartOptions,
};

pub use mcp::{McpServer, StopReason, ToolHandler};

pub use tools::{all_tools, DebuggerTool, DebuggerToolHandler, ToolError};

pub use signal::SignalHandler;
