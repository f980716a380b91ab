//! JSON-RPC 2.0 envelopes and error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use statecraft_agent::TaskError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TASK_NOT_FOUND: i64 = -32001;
pub const TASK_NOT_CANCELABLE: i64 = -32002;
pub const UNSUPPORTED_OPERATION: i64 = -32004;

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl From<TaskError> for RpcError {
    fn from(error: TaskError) -> Self {
        let code = match &error {
            TaskError::TaskNotFound(_) => TASK_NOT_FOUND,
            TaskError::TaskNotCancelable { .. } => TASK_NOT_CANCELABLE,
            TaskError::TaskAlreadyTerminal { .. } | TaskError::ContextMismatch { .. } => {
                UNSUPPORTED_OPERATION
            }
        };
        Self::new(code, error.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn from_result(id: Option<Value>, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::error(id, e),
        }
    }
}

/// Decode a request body. Errors come back as ready-to-send responses.
pub fn parse_request(body: &[u8]) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        RpcResponse::error(None, RpcError::new(PARSE_ERROR, format!("Parse error: {e}")))
    })?;
    let id = value.get("id").cloned();
    let request: RpcRequest = serde_json::from_value(value).map_err(|e| {
        RpcResponse::error(
            id.clone(),
            RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
        )
    })?;
    if request.jsonrpc != "2.0" {
        return Err(RpcResponse::error(
            id,
            RpcError::new(INVALID_REQUEST, "Unsupported jsonrpc version (expected 2.0)"),
        ));
    }
    Ok(request)
}
