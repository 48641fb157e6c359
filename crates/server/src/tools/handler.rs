//! Tool dispatch onto the session manager.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use protocol::{RpcError, ToolDefinition, ToolResult};
use serde_json::Value;
use tracing::{debug, warn};

use super::catalog::{all_tools, DebuggerTool};
use super::commands;
use super::params::{self, require_non_empty};
use super::ToolError;
use crate::mcp::ToolHandler;
use crate::session::{SessionError, SessionLifecycleManager, StartOptions};

/// Runs debugger tools against the sessions of one manager.
pub struct DebuggerToolHandler {
    manager: Arc<SessionLifecycleManager>,
}

impl DebuggerToolHandler {
    pub fn new(manager: Arc<SessionLifecycleManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionLifecycleManager> {
        &self.manager
    }

    /// Run one tool, turning failures into error results.
    pub async fn run(&self, tool: DebuggerTool, arguments: Value) -> ToolResult {
        match self.dispatch(tool, arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = tool.name(), error = %err, "Tool failed");
                failure(tool, err)
            }
        }
    }

    async fn dispatch(
        &self,
        tool: DebuggerTool,
        arguments: Value,
    ) -> Result<ToolResult, ToolError> {
        match tool {
            DebuggerTool::Start => self.start(params::parse(arguments)?).await,
            DebuggerTool::Load => self.load(params::parse(arguments)?).await,
            DebuggerTool::Command => {
                let args: params::CommandArgs = params::parse(arguments)?;
                let command = require_non_empty("command", &args.command)?;
                let out = self.exec(&args.session_id, command).await?;
                Ok(ToolResult::text(format!(
                    "Command: {}\n\nOutput:\n{}",
                    command, out
                )))
            }
            DebuggerTool::Terminate => {
                let args: params::SessionArgs = params::parse(arguments)?;
                self.manager.terminate(&args.session_id).await?;
                Ok(ToolResult::text(format!(
                    "LLDB session terminated: {}",
                    args.session_id
                )))
            }
            DebuggerTool::ListSessions => {
                let sessions = self.manager.list().await;
                let json = serde_json::to_string_pretty(&sessions)
                    .map_err(|e| ToolError::Internal(e.to_string()))?;
                Ok(ToolResult::text(format!(
                    "Active LLDB Sessions ({}):\n\n{}",
                    sessions.len(),
                    json
                )))
            }
            DebuggerTool::LoadCore => self.load_core(params::parse(arguments)?).await,
            DebuggerTool::SetBreakpoint => self.set_breakpoint(params::parse(arguments)?).await,
            DebuggerTool::Continue => {
                let args: params::SessionArgs = params::parse(arguments)?;
                let out = self.exec(&args.session_id, "continue").await?;
                Ok(ToolResult::text(format!("Continued execution\n\nOutput:\n{}", out)))
            }
            DebuggerTool::Step => {
                let args: params::StepArgs = params::parse(arguments)?;
                let out = self
                    .exec(&args.session_id, commands::step(args.instructions))
                    .await?;
                let unit = if args.instructions { "instruction" } else { "line" };
                Ok(ToolResult::text(format!("Stepped {}\n\nOutput:\n{}", unit, out)))
            }
            DebuggerTool::Next => {
                let args: params::StepArgs = params::parse(arguments)?;
                let out = self
                    .exec(&args.session_id, commands::next(args.instructions))
                    .await?;
                let unit = if args.instructions {
                    "instruction"
                } else {
                    "function call"
                };
                Ok(ToolResult::text(format!(
                    "Stepped over {}\n\nOutput:\n{}",
                    unit, out
                )))
            }
            DebuggerTool::Finish => {
                let args: params::SessionArgs = params::parse(arguments)?;
                let out = self.exec(&args.session_id, "finish").await?;
                Ok(ToolResult::text(format!(
                    "Finished current function\n\nOutput:\n{}",
                    out
                )))
            }
            DebuggerTool::Backtrace => {
                let args: params::BacktraceArgs = params::parse(arguments)?;
                let out = self
                    .exec(&args.session_id, &commands::backtrace(args.full, args.limit))
                    .await?;
                let mut title = String::from("Backtrace");
                if args.full {
                    title.push_str(" (full)");
                }
                if let Some(limit) = args.limit {
                    title.push_str(&format!(" (limit: {})", limit));
                }
                Ok(ToolResult::text(format!("{}:\n\n{}", title, out)))
            }
            DebuggerTool::Print => {
                let args: params::PrintArgs = params::parse(arguments)?;
                let expression = require_non_empty("expression", &args.expression)?;
                let out = self
                    .exec(&args.session_id, &commands::print(expression))
                    .await?;
                Ok(ToolResult::text(format!("Print {}:\n\n{}", expression, out)))
            }
            DebuggerTool::Examine => {
                let args: params::ExamineArgs = params::parse(arguments)?;
                let expression = require_non_empty("expression", &args.expression)?;
                let command = commands::examine(expression, &args.format, args.count);
                let out = self.exec(&args.session_id, &command).await?;
                Ok(ToolResult::text(format!(
                    "Examine {} (format: {}, count: {}):\n\n{}",
                    expression, args.format, args.count, out
                )))
            }
            DebuggerTool::InfoRegisters => {
                let args: params::RegistersArgs = params::parse(arguments)?;
                let register = args.register.as_deref().map(str::trim).filter(|r| !r.is_empty());
                let out = self
                    .exec(&args.session_id, &commands::registers(register))
                    .await?;
                let title = match register {
                    Some(r) => format!("Register info for {}", r),
                    None => "Register info".to_string(),
                };
                Ok(ToolResult::text(format!("{}:\n\n{}", title, out)))
            }
            DebuggerTool::Attach => {
                let args: params::AttachArgs = params::parse(arguments)?;
                let out = self
                    .exec(&args.session_id, &commands::attach(args.pid))
                    .await?;
                self.manager
                    .set_target(&args.session_id, format!("pid:{}", args.pid))
                    .await?;
                Ok(ToolResult::text(format!(
                    "Attached to process {}\n\nOutput:\n{}",
                    args.pid, out
                )))
            }
            DebuggerTool::Run => {
                let args: params::SessionArgs = params::parse(arguments)?;
                let out = self.exec(&args.session_id, "run").await?;
                Ok(ToolResult::text(format!("Program started\n\nOutput:\n{}", out)))
            }
            DebuggerTool::FrameInfo => {
                let args: params::FrameArgs = params::parse(arguments)?;
                let outputs = self
                    .manager
                    .execute_all(&args.session_id, &commands::frame_info(args.frame_index))
                    .await?;
                let rendered: Vec<String> = outputs.iter().map(|o| o.render()).collect();
                Ok(ToolResult::text(format!(
                    "Frame {}:\n{}\n\nVariables:\n{}\n\nSource:\n{}",
                    args.frame_index,
                    part(&rendered, 0),
                    part(&rendered, 1),
                    part(&rendered, 2)
                )))
            }
            DebuggerTool::Disassemble => {
                let args: params::DisassembleArgs = params::parse(arguments)?;
                let target = require_non_empty("address", &args.address)?;
                let out = self
                    .exec(&args.session_id, &commands::disassemble(target))
                    .await?;
                Ok(ToolResult::text(format!(
                    "Disassembly of {}:\n\n{}",
                    target, out
                )))
            }
        }
    }

    async fn exec(&self, session_id: &str, command: &str) -> Result<String, SessionError> {
        let output = self.manager.execute(session_id, command).await?;
        Ok(output.render())
    }

    async fn start(&self, args: params::StartArgs) -> Result<ToolResult, ToolError> {
        let options = StartOptions {
            executable: args
                .lldb_path
                .filter(|p| !p.trim().is_empty()),
            working_dir: args
                .working_dir
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
        };
        let started = self.manager.start(options).await?;
        Ok(ToolResult::text(format!(
            "LLDB session started with ID: {}\n\nOutput:\n{}",
            started.id, started.banner
        )))
    }

    async fn load(&self, args: params::LoadArgs) -> Result<ToolResult, ToolError> {
        let program = require_non_empty("program", &args.program)?;
        let session = self.manager.session(&args.session_id)?;
        let path = commands::resolve_path(session.working_dir(), program);

        let mut batch = vec![commands::load_file(&path)];
        batch.extend(commands::run_args(&args.arguments));

        let outputs = self.manager.execute_all(&args.session_id, &batch).await?;
        self.manager
            .set_target(&args.session_id, path.display().to_string())
            .await?;

        let rendered: Vec<String> = outputs.iter().map(|o| o.render()).collect();
        Ok(ToolResult::text(format!(
            "Program loaded: {}\n\nOutput:\n{}",
            path.display(),
            rendered.join("\n")
        )))
    }

    async fn load_core(&self, args: params::LoadCoreArgs) -> Result<ToolResult, ToolError> {
        let program = require_non_empty("program", &args.program)?;
        let core = require_non_empty("corePath", &args.core_path)?;
        let session = self.manager.session(&args.session_id)?;
        let program = commands::resolve_path(session.working_dir(), program);
        let core = commands::resolve_path(session.working_dir(), core);

        let batch = [
            commands::load_file(&program),
            commands::target_core(&core),
            commands::backtrace(false, None),
        ];
        let outputs = self.manager.execute_all(&args.session_id, &batch).await?;
        self.manager
            .set_target(&args.session_id, program.display().to_string())
            .await?;

        let rendered: Vec<String> = outputs.iter().map(|o| o.render()).collect();
        Ok(ToolResult::text(format!(
            "Core file loaded: {}\n\nOutput:\n{}\n{}\n\nBacktrace:\n{}",
            core.display(),
            part(&rendered, 0),
            part(&rendered, 1),
            part(&rendered, 2)
        )))
    }

    async fn set_breakpoint(&self, args: params::BreakpointArgs) -> Result<ToolResult, ToolError> {
        let location = require_non_empty("location", &args.location)?;
        let condition = args
            .condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let set = self
            .manager
            .execute(&args.session_id, &commands::breakpoint_set(location))
            .await?;
        let mut text = set.render();

        if let Some(condition) = condition {
            match commands::breakpoint_id(&set.text) {
                Some(id) => {
                    debug!(breakpoint = id, "Applying breakpoint condition");
                    let modified = self
                        .exec(&args.session_id, &commands::breakpoint_condition(id, condition))
                        .await?;
                    if !modified.is_empty() {
                        text.push('\n');
                        text.push_str(&modified);
                    }
                }
                None => {
                    text.push_str("\n[Could not determine breakpoint number; condition not applied]");
                }
            }
        }

        let heading = match condition {
            Some(c) => format!("Breakpoint set at: {} with condition: {}", location, c),
            None => format!("Breakpoint set at: {}", location),
        };
        Ok(ToolResult::text(format!("{}\n\nOutput:\n{}", heading, text)))
    }
}

#[async_trait]
impl ToolHandler for DebuggerToolHandler {
    fn tools(&self) -> Vec<ToolDefinition> {
        all_tools()
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, RpcError> {
        let tool = DebuggerTool::from_name(name)
            .ok_or_else(|| RpcError::InvalidParams(format!("Unknown tool: {}", name)))?;
        Ok(self.run(tool, arguments).await)
    }
}

fn part(parts: &[String], index: usize) -> &str {
    parts.get(index).map(String::as_str).unwrap_or_default()
}

fn failure(tool: DebuggerTool, err: ToolError) -> ToolResult {
    match err {
        ToolError::Session(e @ SessionError::NotFound(_)) => ToolResult::error(e.to_string()),
        ToolError::InvalidArguments(msg) => {
            ToolResult::error(format!("Invalid arguments for {}: {}", tool.name(), msg))
        }
        other => ToolResult::error(format!("{}: {}", tool.failure_prefix(), other)),
    }
}
