//! MCP (Model Context Protocol) over HTTP and SSE.

pub mod dispatcher;
pub mod http_server;
pub mod protocol;
pub mod sse;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use http_server::{McpHttpConfig, McpHttpServer};
pub use protocol::{codes, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RpcError};
pub use sse::{SseFrame, StreamTimings};
pub use tools::ToolCall;
