//! Configuration management for lldb-mcp.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/lldb-mcp/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::launcher::Readiness;
use crate::session::manager::ManagerConfig;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_sessions must be between 1 and 1000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("command_timeout_ms must be between 100 and 3600000, got {0}")]
    InvalidCommandTimeout(u64),

    #[error("ready_poll_interval_ms must be greater than 0 and at most start_timeout_ms ({start_timeout_ms}), got {poll_interval_ms}")]
    InvalidReadyPollInterval {
        poll_interval_ms: u64,
        start_timeout_ms: u64,
    },

    #[error("prompt_marker must not be empty")]
    EmptyPromptMarker,

    #[error("debugger executable not found: {0}")]
    InvalidDebuggerPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for lldb-mcp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General server configuration.
    pub server: ServerConfig,

    /// Debugger process configuration.
    pub debugger: DebuggerConfig,

    /// Session timing and limits.
    pub session: SessionConfig,
}

/// General server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Debugger process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Debugger executable, a name looked up in PATH or a path.
    pub executable: String,

    /// Extra arguments passed to the debugger.
    pub args: Vec<String>,

    /// Extra environment variables for the debugger.
    pub env: BTreeMap<String, String>,

    /// Prompt text printed by the debugger when it is idle.
    pub prompt_marker: String,

    /// Harmless command written at startup to provoke the first prompt.
    pub probe_command: String,
}

/// Session timing and limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Per-command response timeout in milliseconds.
    pub command_timeout_ms: u64,

    /// Readiness handshake timeout in milliseconds.
    pub start_timeout_ms: u64,

    /// How often startup output is checked for the prompt, in milliseconds.
    pub ready_poll_interval_ms: u64,

    /// Quiet time after which a prompt-echo framed response is accepted,
    /// in milliseconds (0 = disabled).
    pub idle_settle_ms: u64,

    /// Timeout for the graceful `quit` on terminate, in milliseconds.
    pub shutdown_grace_ms: u64,

    /// How often exited sessions are cleaned up, in seconds (0 = never).
    pub reap_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            executable: "lldb".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            prompt_marker: "(lldb)".to_string(),
            probe_command: "version".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            command_timeout_ms: 10_000,
            start_timeout_ms: 10_000,
            ready_poll_interval_ms: 2_000,
            idle_settle_ms: 1_000,
            shutdown_grace_ms: 2_000,
            reap_interval_secs: 30,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lldb-mcp")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LLDB_MCP_DEBUGGER: Override the debugger executable
    /// - LLDB_MCP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - LLDB_MCP_COMMAND_TIMEOUT_MS: Override the per-command timeout
    pub fn apply_env_overrides(&mut self) {
        if let Ok(debugger) = std::env::var("LLDB_MCP_DEBUGGER") {
            if !debugger.is_empty() {
                tracing::info!("Overriding debugger executable from environment: {}", debugger);
                self.debugger.executable = debugger;
            }
        }

        if let Ok(level) = std::env::var("LLDB_MCP_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }

        if let Ok(timeout) = std::env::var("LLDB_MCP_COMMAND_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Overriding command_timeout_ms from environment: {}", ms);
                    self.session.command_timeout_ms = ms;
                }
                Err(_) if timeout.is_empty() => {}
                Err(e) => {
                    tracing::warn!("Ignoring invalid LLDB_MCP_COMMAND_TIMEOUT_MS '{}': {}", timeout, e);
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate max_sessions: 1-1000
        if self.session.max_sessions < 1 || self.session.max_sessions > 1000 {
            return Err(ConfigError::InvalidMaxSessions(self.session.max_sessions));
        }

        // Validate command_timeout_ms: 100ms-1h
        if !(100..=3_600_000).contains(&self.session.command_timeout_ms) {
            return Err(ConfigError::InvalidCommandTimeout(
                self.session.command_timeout_ms,
            ));
        }

        let poll = self.session.ready_poll_interval_ms;
        if poll == 0 || poll > self.session.start_timeout_ms {
            return Err(ConfigError::InvalidReadyPollInterval {
                poll_interval_ms: poll,
                start_timeout_ms: self.session.start_timeout_ms,
            });
        }

        if self.debugger.prompt_marker.is_empty() {
            return Err(ConfigError::EmptyPromptMarker);
        }

        // Validate the debugger can be found
        let debugger_path = Path::new(&self.debugger.executable);
        if debugger_path.is_absolute() {
            if !debugger_path.exists() {
                return Err(ConfigError::InvalidDebuggerPath(
                    self.debugger.executable.clone(),
                ));
            }
        } else if which::which(&self.debugger.executable).is_err() {
            return Err(ConfigError::InvalidDebuggerPath(
                self.debugger.executable.clone(),
            ));
        }

        // Validate log_level is a known value
        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        Ok(())
    }

    /// Settings for the session lifecycle manager.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            executable: self.debugger.executable.clone(),
            args: self.debugger.args.clone(),
            env: self
                .debugger
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            readiness: Readiness {
                probe_command: self.debugger.probe_command.clone(),
                prompt_marker: self.debugger.prompt_marker.clone(),
                poll_interval: Duration::from_millis(self.session.ready_poll_interval_ms),
                start_timeout: Duration::from_millis(self.session.start_timeout_ms),
            },
            command_timeout: Duration::from_millis(self.session.command_timeout_ms),
            idle_settle: match self.session.idle_settle_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            shutdown_grace: Duration::from_millis(self.session.shutdown_grace_ms),
            max_sessions: self.session.max_sessions,
        }
    }

    /// Interval of the background reaper, if enabled.
    pub fn reap_interval(&self) -> Option<Duration> {
        match self.session.reap_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
