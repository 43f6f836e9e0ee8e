//! HTTP surface of the MCP bridge.
//!
//! Endpoints:
//! - `GET /mcp/{client}/sse` opens a session and streams its responses
//! - `POST /mcp/messages/{session_id}` accepts a request for a session
//! - `POST /mcp/rpc` answers a request synchronously
//! - `GET /health` and `GET /` for liveness checks

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::dispatcher::{Dispatcher, SERVER_NAME};
use super::protocol::{JsonRpcMessage, JsonRpcResponse, RpcError};
use super::sse::{session_stream, StreamTimings};
use crate::domain::models::{CallerIdentity, Config};
use crate::domain::ports::{IdentityRepository, MemoryRepository};
use crate::services::{RegistryError, SessionRegistry};

/// Configuration for the MCP HTTP server.
#[derive(Debug, Clone)]
pub struct McpHttpConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub enable_cors: bool,
    /// Idle time before an SSE keepalive comment.
    pub keepalive: Duration,
    /// Delay between a stream ending and its session being removed.
    pub cleanup_grace: Duration,
    /// Prefix for advertised intake paths when served behind a proxy.
    pub public_base_path: String,
    /// App that SSE and direct callers are scoped to.
    pub default_app: String,
}

impl Default for McpHttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            enable_cors: true,
            keepalive: Duration::from_secs(30),
            cleanup_grace: Duration::from_secs(5),
            public_base_path: String::new(),
            default_app: "default".to_string(),
        }
    }
}

impl From<&Config> for McpHttpConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            enable_cors: config.server.enable_cors,
            keepalive: Duration::from_secs(config.server.keepalive_secs),
            cleanup_grace: Duration::from_secs(config.server.cleanup_grace_secs),
            public_base_path: config.server.public_base_path.clone(),
            default_app: config.default_app.clone(),
        }
    }
}

struct AppState<M: MemoryRepository, I: IdentityRepository> {
    dispatcher: Dispatcher<M, I>,
    registry: Arc<SessionRegistry>,
    config: McpHttpConfig,
    shutdown: CancellationToken,
}

impl<M: MemoryRepository, I: IdentityRepository> AppState<M, I> {
    fn timings(&self) -> StreamTimings {
        StreamTimings {
            keepalive: self.config.keepalive,
            cleanup_grace: self.config.cleanup_grace,
        }
    }

    fn intake_path(&self, session_id: &uuid::Uuid) -> String {
        format!(
            "{}/mcp/messages/{}",
            self.config.public_base_path.trim_end_matches('/'),
            session_id
        )
    }

    /// Resolve the request credential to an identity, or the rejection to send.
    async fn authenticate(&self, credential: Option<String>, client: &str) -> Result<CallerIdentity, Response> {
        let Some(credential) = credential else {
            return Err(rpc_error(
                StatusCode::UNAUTHORIZED,
                Value::Null,
                RpcError::unauthorized("API key required"),
            ));
        };

        match self.dispatcher.service().identities().validate(&credential).await {
            Ok(Some(user)) => Ok(CallerIdentity::new(user.user_id, &self.config.default_app, client)),
            Ok(None) => {
                tracing::warn!(client = %client, "rejected invalid API key");
                Err(rpc_error(
                    StatusCode::UNAUTHORIZED,
                    Value::Null,
                    RpcError::unauthorized("invalid API key"),
                ))
            }
            Err(e) => {
                tracing::error!(client = %client, error = %e, "credential validation failed");
                Err(rpc_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Value::Null,
                    RpcError::internal("credential validation failed"),
                ))
            }
        }
    }
}

/// MCP HTTP/SSE server.
pub struct McpHttpServer<M: MemoryRepository + 'static, I: IdentityRepository + 'static> {
    state: Arc<AppState<M, I>>,
}

impl<M: MemoryRepository + 'static, I: IdentityRepository + 'static> McpHttpServer<M, I> {
    /// Server sharing `registry` with whoever else needs to inspect sessions.
    pub fn new(dispatcher: Dispatcher<M, I>, registry: Arc<SessionRegistry>, config: McpHttpConfig) -> Self {
        Self {
            state: Arc::new(AppState {
                dispatcher,
                registry,
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Sessions currently known to the server.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Token that ends every open SSE stream when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Build the router with all endpoints.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .route("/mcp/{client}/sse", get(open_stream::<M, I>))
            .route("/mcp/messages/{session_id}", post(post_message::<M, I>))
            .route("/mcp/rpc", post(direct_rpc::<M, I>))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.state.config.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves, then end all streams and drop all sessions.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.state.config.host, self.state.config.port).parse()?;
        let router = self.build_router();

        let token = self.shutdown_token();
        let signal = async move {
            shutdown.await;
            token.cancel();
        };

        tracing::info!("MCP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        let closed = self.state.registry.shutdown();
        tracing::info!(closed_sessions = closed, "MCP server stopped");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialQuery {
    key: Option<String>,
}

/// Credential from `Authorization: Bearer`, `X-API-Key` or the `key` query parameter.
fn extract_credential(headers: &HeaderMap, query: CredentialQuery) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let api_key_header = headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::trim);

    bearer
        .or(api_key_header)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or(query.key.filter(|k| !k.is_empty()))
}

fn rpc_error(status: StatusCode, id: Value, error: RpcError) -> Response {
    (status, Json(JsonRpcResponse::failure(id, error))).into_response()
}

fn accepted() -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

// Handler functions

async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn open_stream<M: MemoryRepository + 'static, I: IdentityRepository + 'static>(
    State(state): State<Arc<AppState<M, I>>>,
    Path(client): Path<String>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
) -> Response {
    let identity = match state.authenticate(extract_credential(&headers, query), &client).await {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    let user_id = identity.user_id.clone();
    let opened = state.registry.open(identity);
    let endpoint = state.intake_path(&opened.session.id);

    tracing::info!(
        session_id = %opened.session.id,
        user_id = %user_id,
        client = %client,
        "sse session opened"
    );

    let frames = session_stream(
        Arc::clone(&state.registry),
        opened,
        endpoint,
        state.timings(),
        state.shutdown.child_token(),
    );

    Sse::new(frames.map(|frame| Ok::<_, Infallible>(frame.into_event()))).into_response()
}

async fn post_message<M: MemoryRepository + 'static, I: IdentityRepository + 'static>(
    State(state): State<Arc<AppState<M, I>>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let parsed = JsonRpcMessage::parse(&body);

    let session = match state.registry.lookup(&session_id) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "message for unknown session");
            let id = match &parsed {
                Ok(JsonRpcMessage::Request(req)) => req.id.clone(),
                _ => Value::Null,
            };
            return rpc_error(StatusCode::NOT_FOUND, id, RpcError::invalid_session(&session_id));
        }
    };

    let request = match parsed {
        Ok(JsonRpcMessage::Request(request)) => request,
        Ok(JsonRpcMessage::Notification(notification)) => {
            state.dispatcher.notify(&notification.method, &session.identity);
            return accepted();
        }
        Ok(JsonRpcMessage::Response(_)) => return accepted(),
        Err(rejected) => {
            return rpc_error(StatusCode::BAD_REQUEST, rejected.id, rejected.error);
        }
    };

    // Claim queue space before running the request so a session that can
    // no longer take the response never executes it.
    let slot = match session.reserve() {
        Ok(slot) => slot,
        Err(RegistryError::QueueFull(_)) => {
            tracing::warn!(session_id = %session.id, "session queue full, client is not reading");
            return rpc_error(
                StatusCode::SERVICE_UNAVAILABLE,
                request.id,
                RpcError::internal("session queue is full"),
            );
        }
        Err(e) => {
            tracing::debug!(session_id = %session.id, error = %e, "session stopped accepting messages");
            return rpc_error(StatusCode::NOT_FOUND, request.id, RpcError::invalid_session(&session_id));
        }
    };

    let method = request.method.clone();
    let response = state.dispatcher.dispatch(request, &session.identity).await;
    slot.send(response.to_value());
    tracing::debug!(session_id = %session.id, method = %method, "response queued");
    accepted()
}

async fn direct_rpc<M: MemoryRepository + 'static, I: IdentityRepository + 'static>(
    State(state): State<Arc<AppState<M, I>>>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client = headers
        .get("x-client-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("direct")
        .to_string();

    let identity = match state.authenticate(extract_credential(&headers, query), &client).await {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    match JsonRpcMessage::parse(&body) {
        Ok(JsonRpcMessage::Request(request)) => {
            Json(state.dispatcher.dispatch(request, &identity).await).into_response()
        }
        Ok(JsonRpcMessage::Notification(notification)) => {
            state.dispatcher.notify(&notification.method, &identity);
            StatusCode::ACCEPTED.into_response()
        }
        Ok(JsonRpcMessage::Response(_)) => StatusCode::ACCEPTED.into_response(),
        Err(rejected) => rpc_error(StatusCode::BAD_REQUEST, rejected.id, rejected.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(key: Option<&str>) -> CredentialQuery {
        CredentialQuery {
            key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_bearer_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer mem_lab_a"));
        headers.insert("x-api-key", HeaderValue::from_static("mem_lab_b"));

        assert_eq!(extract_credential(&headers, query(Some("mem_lab_c"))).as_deref(), Some("mem_lab_a"));
    }

    #[test]
    fn test_api_key_header_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("mem_lab_b"));
        assert_eq!(extract_credential(&headers, query(Some("mem_lab_c"))).as_deref(), Some("mem_lab_b"));

        assert_eq!(
            extract_credential(&HeaderMap::new(), query(Some("mem_lab_c"))).as_deref(),
            Some("mem_lab_c")
        );
    }

    #[test]
    fn test_missing_or_blank_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_credential(&headers, query(None)), None);

        let mut blank = HeaderMap::new();
        blank.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_credential(&blank, query(Some(""))), None);
    }

    #[test]
    fn test_config_from_service_config() {
        let mut config = Config::default();
        config.server.keepalive_secs = 12;
        config.server.public_base_path = "/proxy/".to_string();
        config.default_app = "notes".to_string();

        let http = McpHttpConfig::from(&config);

        assert_eq!(http.keepalive, Duration::from_secs(12));
        assert_eq!(http.cleanup_grace, Duration::from_secs(5));
        assert_eq!(http.public_base_path, "/proxy/");
        assert_eq!(http.default_app, "notes");
    }
}
