//! Typed tool arguments.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::ToolError;

/// Decode a tool's arguments. Missing arguments are treated as `{}`.
pub fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Reject empty or whitespace-only strings.
pub fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "`{}` must not be empty",
            field
        )));
    }
    Ok(trimmed)
}

/// Accepts `42`, `42.0` or `"42"`.
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    number
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {}", value)))
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "lenient_u32")] u32);

    Option::<Wrap>::deserialize(deserializer).map(|w| w.map(|Wrap(n)| n))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartArgs {
    pub lldb_path: Option<String>,
    pub working_dir: Option<String>,
}

/// Arguments for tools that only name a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadArgs {
    pub session_id: String,
    pub program: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArgs {
    pub session_id: String,
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCoreArgs {
    pub session_id: String,
    pub program: String,
    pub core_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointArgs {
    pub session_id: String,
    pub location: String,
    pub condition: Option<String>,
}

/// Arguments for `step` and `next`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepArgs {
    pub session_id: String,
    #[serde(default)]
    pub instructions: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceArgs {
    pub session_id: String,
    #[serde(default)]
    pub full: bool,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintArgs {
    pub session_id: String,
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamineArgs {
    pub session_id: String,
    pub expression: String,
    #[serde(default = "default_examine_format")]
    pub format: String,
    #[serde(default = "default_examine_count", deserialize_with = "lenient_u32")]
    pub count: u32,
}

fn default_examine_format() -> String {
    "x".to_string()
}

fn default_examine_count() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistersArgs {
    pub session_id: String,
    pub register: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArgs {
    pub session_id: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub pid: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameArgs {
    pub session_id: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub frame_index: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisassembleArgs {
    pub session_id: String,
    pub address: String,
}
