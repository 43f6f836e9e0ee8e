//! Stateless JSON-RPC router for the MCP methods.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::protocol::{JsonRpcRequest, JsonRpcResponse, RpcError, PROTOCOL_VERSION};
use super::tools::{self, ToolCall};
use crate::domain::models::CallerIdentity;
use crate::domain::ports::{IdentityRepository, MemoryRepository};
use crate::services::MemoryService;

/// Name reported in the `initialize` handshake.
pub const SERVER_NAME: &str = "openmemory";

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    arguments: Value,
}

/// Routes JSON-RPC requests to the MCP methods and memory tools.
///
/// Holds no per-session state, so one instance serves every session and the
/// direct RPC endpoint alike.
pub struct Dispatcher<M: MemoryRepository, I: IdentityRepository> {
    service: Arc<MemoryService<M, I>>,
}

impl<M: MemoryRepository, I: IdentityRepository> Clone for Dispatcher<M, I> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<M: MemoryRepository, I: IdentityRepository> Dispatcher<M, I> {
    /// Dispatcher running tools against `service`.
    pub fn new(service: Arc<MemoryService<M, I>>) -> Self {
        Self { service }
    }

    /// The memory service the tools run against.
    pub fn service(&self) -> &Arc<MemoryService<M, I>> {
        &self.service
    }

    /// Answer one request. Never fails: every outcome is a JSON-RPC response.
    pub async fn dispatch(&self, request: JsonRpcRequest, caller: &CallerIdentity) -> JsonRpcResponse {
        let JsonRpcRequest { id, method, params } = request;

        let outcome = match method.as_str() {
            "initialize" => Ok(initialize_result()),
            "tools/list" => Ok(tools::catalog()),
            "tools/call" => self.call_tool(params, caller).await,
            "ping" => Ok(json!({})),
            other => Err(RpcError::method_not_found(other)),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                tracing::debug!(method = %method, code = error.code, "request rejected");
                JsonRpcResponse::failure(id, error)
            }
        }
    }

    /// Handle a notification. Nothing is ever sent back.
    pub fn notify(&self, method: &str, caller: &CallerIdentity) {
        tracing::debug!(method = %method, user_id = %caller.user_id, "notification received");
    }

    async fn call_tool(&self, params: Option<Value>, caller: &CallerIdentity) -> Result<Value, RpcError> {
        let params = params.ok_or_else(|| RpcError::invalid_params("missing params"))?;
        let ToolCallParams { name, arguments } = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("tools/call requires name and arguments: {}", e)))?;

        let call = ToolCall::parse(&name, arguments)?;

        match call.execute(&self.service, caller).await {
            Ok(text) => Ok(json!({
                "content": [{ "type": "text", "text": text }]
            })),
            Err(fault) => {
                tracing::error!(
                    tool = call.name(),
                    user_id = %caller.user_id,
                    client = %caller.client,
                    error = %fault,
                    "tool execution failed"
                );
                Ok(json!({
                    "content": [{ "type": "text", "text": format!("Error: {}", fault) }],
                    "isError": true
                }))
            }
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
