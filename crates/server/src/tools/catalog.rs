//! Tool catalog: names, descriptions and JSON argument schemas.

use protocol::ToolDefinition;
use serde_json::{json, Map, Value};

/// Every tool the server offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebuggerTool {
    Start,
    Load,
    Command,
    Terminate,
    ListSessions,
    LoadCore,
    SetBreakpoint,
    Continue,
    Step,
    Next,
    Finish,
    Backtrace,
    Print,
    Examine,
    InfoRegisters,
    Attach,
    Run,
    FrameInfo,
    Disassemble,
}

impl DebuggerTool {
    /// All tools in listing order.
    pub const ALL: [DebuggerTool; 19] = [
        DebuggerTool::Start,
        DebuggerTool::Load,
        DebuggerTool::Command,
        DebuggerTool::Terminate,
        DebuggerTool::ListSessions,
        DebuggerTool::LoadCore,
        DebuggerTool::SetBreakpoint,
        DebuggerTool::Continue,
        DebuggerTool::Step,
        DebuggerTool::Next,
        DebuggerTool::Finish,
        DebuggerTool::Backtrace,
        DebuggerTool::Print,
        DebuggerTool::Examine,
        DebuggerTool::InfoRegisters,
        DebuggerTool::Attach,
        DebuggerTool::Run,
        DebuggerTool::FrameInfo,
        DebuggerTool::Disassemble,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            DebuggerTool::Start => "lldb_start",
            DebuggerTool::Load => "lldb_load",
            DebuggerTool::Command => "lldb_command",
            DebuggerTool::Terminate => "lldb_terminate",
            DebuggerTool::ListSessions => "lldb_list_sessions",
            DebuggerTool::LoadCore => "lldb_load_core",
            DebuggerTool::SetBreakpoint => "lldb_set_breakpoint",
            DebuggerTool::Continue => "lldb_continue",
            DebuggerTool::Step => "lldb_step",
            DebuggerTool::Next => "lldb_next",
            DebuggerTool::Finish => "lldb_finish",
            DebuggerTool::Backtrace => "lldb_backtrace",
            DebuggerTool::Print => "lldb_print",
            DebuggerTool::Examine => "lldb_examine",
            DebuggerTool::InfoRegisters => "lldb_info_registers",
            DebuggerTool::Attach => "lldb_attach",
            DebuggerTool::Run => "lldb_run",
            DebuggerTool::FrameInfo => "lldb_frame_info",
            DebuggerTool::Disassemble => "lldb_disassemble",
        }
    }

    /// Look a tool up by wire name. Matching ignores ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name().eq_ignore_ascii_case(name))
    }

    /// One-line description.
    pub fn description(self) -> &'static str {
        match self {
            DebuggerTool::Start => "Start a new LLDB session",
            DebuggerTool::Load => "Load a program into LLDB",
            DebuggerTool::Command => "Execute a raw LLDB command",
            DebuggerTool::Terminate => "Terminate an LLDB session",
            DebuggerTool::ListSessions => "List all active LLDB sessions",
            DebuggerTool::LoadCore => "Load a program together with a core dump file",
            DebuggerTool::SetBreakpoint => "Set a breakpoint, optionally with a condition",
            DebuggerTool::Continue => "Continue program execution",
            DebuggerTool::Step => "Step into the next source line or instruction",
            DebuggerTool::Next => "Step over function calls",
            DebuggerTool::Finish => "Execute until the current function returns",
            DebuggerTool::Backtrace => "Show the call stack",
            DebuggerTool::Print => "Print the value of an expression",
            DebuggerTool::Examine => "Examine memory",
            DebuggerTool::InfoRegisters => "Display registers",
            DebuggerTool::Attach => "Attach to a running process",
            DebuggerTool::Run => "Run the loaded program",
            DebuggerTool::FrameInfo => "Display frame information, variables and source",
            DebuggerTool::Disassemble => "Disassemble a function or address",
        }
    }

    /// Prefix for failure messages, e.g. "Failed to set breakpoint".
    pub fn failure_prefix(self) -> &'static str {
        match self {
            DebuggerTool::Start => "Failed to start LLDB",
            DebuggerTool::Load => "Failed to load program",
            DebuggerTool::Command => "Failed to execute command",
            DebuggerTool::Terminate => "Failed to terminate LLDB session",
            DebuggerTool::ListSessions => "Failed to list sessions",
            DebuggerTool::LoadCore => "Failed to load core file",
            DebuggerTool::SetBreakpoint => "Failed to set breakpoint",
            DebuggerTool::Continue => "Failed to continue execution",
            DebuggerTool::Step => "Failed to step",
            DebuggerTool::Next => "Failed to step over",
            DebuggerTool::Finish => "Failed to finish function",
            DebuggerTool::Backtrace => "Failed to get backtrace",
            DebuggerTool::Print => "Failed to print expression",
            DebuggerTool::Examine => "Failed to examine memory",
            DebuggerTool::InfoRegisters => "Failed to get register info",
            DebuggerTool::Attach => "Failed to attach to process",
            DebuggerTool::Run => "Failed to run the program",
            DebuggerTool::FrameInfo => "Failed to get frame info",
            DebuggerTool::Disassemble => "Failed to disassemble",
        }
    }

    /// JSON Schema of the arguments object.
    pub fn input_schema(self) -> Value {
        let session = ("sessionId", prop("string", "LLDB session ID"));
        let instructions = (
            "instructions",
            prop("boolean", "Step by instructions instead of source lines (optional)"),
        );

        let (properties, required): (Vec<(&str, Value)>, Vec<&str>) = match self {
            DebuggerTool::Start => (
                vec![
                    (
                        "lldbPath",
                        prop("string", "Path to the LLDB executable (optional, defaults to the configured debugger)"),
                    ),
                    ("workingDir", prop("string", "Working directory for LLDB (optional)")),
                ],
                vec![],
            ),
            DebuggerTool::Load => (
                vec![
                    session,
                    ("program", prop("string", "Path to the program to debug")),
                    (
                        "arguments",
                        json!({
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Command-line arguments for the program (optional)"
                        }),
                    ),
                ],
                vec!["sessionId", "program"],
            ),
            DebuggerTool::Command => (
                vec![session, ("command", prop("string", "LLDB command to execute"))],
                vec!["sessionId", "command"],
            ),
            DebuggerTool::Terminate
            | DebuggerTool::Continue
            | DebuggerTool::Finish
            | DebuggerTool::Run => (vec![session], vec!["sessionId"]),
            DebuggerTool::ListSessions => (vec![], vec![]),
            DebuggerTool::LoadCore => (
                vec![
                    session,
                    ("program", prop("string", "Path to the program executable")),
                    ("corePath", prop("string", "Path to the core dump file")),
                ],
                vec!["sessionId", "program", "corePath"],
            ),
            DebuggerTool::SetBreakpoint => (
                vec![
                    session,
                    (
                        "location",
                        prop("string", "Breakpoint location (e.g., function name, file:line)"),
                    ),
                    ("condition", prop("string", "Breakpoint condition (optional)")),
                ],
                vec!["sessionId", "location"],
            ),
            DebuggerTool::Step | DebuggerTool::Next => {
                (vec![session, instructions], vec!["sessionId"])
            }
            DebuggerTool::Backtrace => (
                vec![
                    session,
                    ("full", prop("boolean", "Show variables in each frame (optional)")),
                    ("limit", prop("number", "Maximum number of frames to show (optional)")),
                ],
                vec!["sessionId"],
            ),
            DebuggerTool::Print => (
                vec![session, ("expression", prop("string", "Expression to evaluate"))],
                vec!["sessionId", "expression"],
            ),
            DebuggerTool::Examine => (
                vec![
                    session,
                    ("expression", prop("string", "Memory address or expression")),
                    (
                        "format",
                        prop("string", "Display format, GDB style: optional size letter (b, h, w, g) then format letter (x, d, u, o, t, f, c, i, s). Defaults to \"x\""),
                    ),
                    ("count", prop("number", "Number of units to display (default 1)")),
                ],
                vec!["sessionId", "expression"],
            ),
            DebuggerTool::InfoRegisters => (
                vec![
                    session,
                    ("register", prop("string", "Specific register to display (optional)")),
                ],
                vec!["sessionId"],
            ),
            DebuggerTool::Attach => (
                vec![session, ("pid", prop("number", "Process ID to attach to"))],
                vec!["sessionId", "pid"],
            ),
            DebuggerTool::FrameInfo => (
                vec![session, ("frameIndex", prop("number", "Frame index"))],
                vec!["sessionId", "frameIndex"],
            ),
            DebuggerTool::Disassemble => (
                vec![
                    session,
                    ("address", prop("string", "Function name or address to disassemble")),
                ],
                vec!["sessionId", "address"],
            ),
        };

        let properties: Map<String, Value> = properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// MCP definition.
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

fn prop(kind: &str, description: &str) -> Value {
    json!({ "type": kind, "description": description })
}

/// Definitions of every tool, in listing order.
pub fn all_tools() -> Vec<ToolDefinition> {
    DebuggerTool::ALL.iter().map(|t| t.definition()).collect()
}
