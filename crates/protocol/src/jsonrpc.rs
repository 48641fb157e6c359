//! JSON-RPC 2.0 envelope types.
//!
//! MCP rides on JSON-RPC 2.0. Requests carry an `id` and expect exactly one
//! response; notifications have no `id` and must never be answered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// JSON-RPC 2.0 version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
    /// Null ID, used when replying to a request whose id could not be read.
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// An incoming JSON-RPC message: a request when `id` is present, a
/// notification otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Request parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    /// Build a request with an id.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether this message expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Check the envelope version.
    pub fn validate(&self) -> Result<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(ProtocolError::InvalidEnvelope(format!(
                "expected jsonrpc version '{}', got '{}'",
                JSONRPC_VERSION, self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(ProtocolError::InvalidEnvelope("empty method".to_string()));
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Id of the request being answered.
    pub id: RequestId,
}

impl Response {
    /// Create a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response from an [`RpcError`].
    pub fn failure(id: RequestId, err: RpcError) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(err.into()),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcError> for ErrorObject {
    fn from(err: RpcError) -> Self {
        ErrorObject {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

/// Standard JSON-RPC 2.0 errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Invalid JSON was received.
    #[error("Parse error: {0}")]
    ParseError(String),
    /// The JSON sent is not a valid request object.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),
    /// The method does not exist.
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    /// Invalid method parameters.
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    /// Internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RpcError {
    /// The numeric JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::ParseError(_) => -32700,
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::InternalError(_) => -32603,
        }
    }
}

impl From<ProtocolError> for RpcError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Deserialization(msg) | ProtocolError::InvalidUtf8(msg) => {
                RpcError::ParseError(msg)
            }
            ProtocolError::InvalidEnvelope(msg) => RpcError::InvalidRequest(msg),
            err @ ProtocolError::FrameTooLarge { .. } => RpcError::InvalidRequest(err.to_string()),
            other => RpcError::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::LineCodec;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let codec = LineCodec::new();
        let req: Request = codec
            .decode(br#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#)
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, Some(RequestId::Number(1)));
        assert!(!req.is_notification());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_notification() {
        let codec = LineCodec::new();
        let req: Request = codec
            .decode(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap()
            .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn test_string_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping","id":"abc"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::String("abc".to_string())));
    }

    #[test]
    fn test_validate_wrong_version() {
        let mut req = Request::new(1, "ping", None);
        req.jsonrpc = "1.0".to_string();
        assert!(matches!(
            req.validate(),
            Err(ProtocolError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_response_success_omits_error() {
        let resp = Response::success(RequestId::Number(1), json!({"ok": true}));
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains("\"result\""));
        assert!(!text.contains("\"error\""));
    }

    #[test]
    fn test_response_failure_code() {
        let resp = Response::failure(
            RequestId::Number(7),
            RpcError::MethodNotFound("bogus".to_string()),
        );
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains("-32601"));
        assert!(text.contains("Method not found: bogus"));
        assert!(!text.contains("\"result\""));
    }

    #[test]
    fn test_protocol_error_mapping() {
        let err: RpcError = ProtocolError::Deserialization("eof".to_string()).into();
        assert_eq!(err.code(), -32700);

        let err: RpcError = ProtocolError::InvalidEnvelope("bad".to_string()).into();
        assert_eq!(err.code(), -32600);
    }
}
