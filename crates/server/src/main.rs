//! lldb-mcp
//!
//! MCP server exposing LLDB sessions as tools over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lldb_mcp::config::{default_config_path, Config, ConfigError};
use lldb_mcp::mcp::{McpServer, StopReason};
use lldb_mcp::protocol::ServerInfo;
use lldb_mcp::session::{SessionLifecycleManager, SessionRegistry};
use lldb_mcp::signal::SignalHandler;
use lldb_mcp::tools::{all_tools, DebuggerToolHandler};
use tracing_subscriber::EnvFilter;

/// lldb-mcp - drive LLDB debugger sessions through the Model Context Protocol.
#[derive(Parser, Debug)]
#[command(name = "lldb-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debugger executable, overriding the configuration
    #[arg(long, global = true, value_name = "PATH")]
    pub lldb_path: Option<String>,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve MCP on stdin/stdout
    Serve,

    /// Print the tool catalog as JSON
    Tools,

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    if let Some(path) = &cli.lldb_path {
        config.debugger.executable = path.clone();
    }

    init_logging(&config, cli.verbose);
    tracing::debug!("Using config file: {:?}", config_path);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Tools => {
            let tools = serde_json::to_string_pretty(&all_tools())
                .context("Failed to serialize tool catalog")?;
            println!("{}", tools);
            Ok(())
        }
        Commands::Config { write } => {
            print!("{}", config.to_toml()?);
            if write {
                config.save(&config_path)?;
                eprintln!("Configuration written to {}", config_path.display());
            }
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    match config.validate() {
        Ok(()) => {}
        // Sessions may still name their own debugger.
        Err(e @ ConfigError::InvalidDebuggerPath(_)) => tracing::warn!("{}", e),
        Err(e) => return Err(e).context("Invalid configuration"),
    }

    tracing::info!(
        debugger = %config.debugger.executable,
        max_sessions = config.session.max_sessions,
        "lldb-mcp starting"
    );

    let registry = Arc::new(SessionRegistry::new());
    let manager = Arc::new(SessionLifecycleManager::new(
        config.manager_config(),
        registry,
    ));

    let reaper = config
        .reap_interval()
        .map(|interval| manager.start_reaper(interval));

    let (signals, shutdown) = SignalHandler::new();
    let signal_task = tokio::spawn(signals.run());

    let handler = Arc::new(DebuggerToolHandler::new(Arc::clone(&manager)));
    let server = McpServer::new(
        handler,
        ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    let outcome = server.run_stdio(shutdown).await;
    match &outcome {
        Ok(StopReason::Eof) => tracing::info!("Client disconnected"),
        Ok(StopReason::Shutdown) => {}
        Err(e) => tracing::error!("MCP transport failed: {}", e),
    }

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    signal_task.abort();

    let terminated = manager.shutdown_all().await;
    tracing::info!(terminated, "lldb-mcp stopped");

    match outcome {
        // The blocking stdin reader would keep the runtime from shutting down.
        Ok(StopReason::Shutdown) => std::process::exit(0),
        other => other.map(|_| ()).context("MCP transport failed"),
    }
}
