//! JSON-RPC 2.0 envelope types for the MCP transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Session id unknown, expired or closed.
    pub const INVALID_SESSION: i32 = -32001;
    /// Credential missing or rejected.
    pub const UNAUTHORIZED: i32 = -32002;
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::PARSE_ERROR, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::INVALID_REQUEST, format!("Invalid request: {}", detail))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::INVALID_PARAMS, format!("Invalid params: {}", detail))
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(codes::INVALID_PARAMS, format!("Unknown tool: {}", name))
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::INTERNAL_ERROR, format!("Internal error: {}", detail))
    }

    pub fn invalid_session(session_id: &str) -> Self {
        Self::new(codes::INVALID_SESSION, "Invalid or expired session")
            .with_data(serde_json::json!({ "session_id": session_id }))
    }

    pub fn unauthorized(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::UNAUTHORIZED, format!("Unauthorized: {}", detail))
    }
}

/// A request expecting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Caller-chosen id: number, string or null. Echoed back untouched.
    pub id: Value,
    pub method: String,
    pub params: Option<Value>,
}

/// A request without an id. Never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": Value::Null,
                "error": RpcError::internal(e),
            })
        })
    }
}

/// Any inbound JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

/// A message that could not be turned into a [`JsonRpcMessage`], with the
/// id to answer under when one could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: Value,
    pub error: RpcError,
}

impl Rejected {
    fn new(id: Value, error: RpcError) -> Self {
        Self { id, error }
    }
}

impl JsonRpcMessage {
    /// Parse and classify a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, Rejected> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Rejected::new(Value::Null, RpcError::parse_error(e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, Rejected> {
        let Value::Object(mut object) = value else {
            return Err(Rejected::new(
                Value::Null,
                RpcError::invalid_request("expected a JSON object"),
            ));
        };

        let id = object.remove("id");
        let echo_id = id.clone().filter(is_valid_id).unwrap_or(Value::Null);

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(Rejected::new(
                echo_id,
                RpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        if let Some(id) = &id {
            if !is_valid_id(id) {
                return Err(Rejected::new(
                    Value::Null,
                    RpcError::invalid_request("id must be a number, string or null"),
                ));
            }
        }

        let params = object.remove("params");
        if let Some(p) = &params {
            if !(p.is_object() || p.is_array()) {
                return Err(Rejected::new(
                    echo_id,
                    RpcError::invalid_request("params must be an object or array"),
                ));
            }
        }

        match object.remove("method") {
            Some(Value::String(method)) => Ok(match id {
                Some(id) => Self::Request(JsonRpcRequest { id, method, params }),
                None => Self::Notification(JsonRpcNotification { method, params }),
            }),
            Some(_) => Err(Rejected::new(
                echo_id,
                RpcError::invalid_request("method must be a string"),
            )),
            None if id.is_some() && (object.contains_key("result") || object.contains_key("error")) => {
                let error = match object.remove("error") {
                    Some(e) => Some(
                        serde_json::from_value(e)
                            .map_err(|e| Rejected::new(echo_id.clone(), RpcError::invalid_request(e)))?,
                    ),
                    None => None,
                };
                Ok(Self::Response(JsonRpcResponse {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id: echo_id,
                    result: object.remove("result"),
                    error,
                }))
            }
            None => Err(Rejected::new(echo_id, RpcError::invalid_request("missing method"))),
        }
    }
}

fn is_valid_id(id: &Value) -> bool {
    matches!(id, Value::Null | Value::Number(_) | Value::String(_))
}
