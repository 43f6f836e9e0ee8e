//! Shared fixtures for the HTTP integration tests.
#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use openmemory::adapters::mcp::{Dispatcher, McpHttpConfig, McpHttpServer};
use openmemory::adapters::sqlite::{
    create_migrated_test_pool, SqliteIdentityRepository, SqliteMemoryRepository,
};
use openmemory::domain::ports::{IdentityRepository, NullSearchIndex};
use openmemory::services::DEFAULT_QUEUE_CAPACITY;
use openmemory::{MemoryService, SessionRegistry};

pub struct TestApp {
    pub router: Router,
    pub registry: Arc<SessionRegistry>,
    pub api_key: String,
}

pub async fn spawn_app(keepalive: Duration, cleanup_grace: Duration) -> TestApp {
    spawn_app_with_queue(keepalive, cleanup_grace, DEFAULT_QUEUE_CAPACITY).await
}

pub async fn spawn_app_with_queue(
    keepalive: Duration,
    cleanup_grace: Duration,
    queue_capacity: usize,
) -> TestApp {
    let pool = create_migrated_test_pool().await.expect("test pool");
    let identities = Arc::new(SqliteIdentityRepository::new(pool.clone()));
    let (_, api_key) = identities
        .create_user("alice", Some("Alice"), None)
        .await
        .expect("seed user");

    let service = MemoryService::new(
        Arc::new(SqliteMemoryRepository::new(pool)),
        identities,
        Arc::new(NullSearchIndex::new()),
    );
    let registry = Arc::new(SessionRegistry::with_queue_capacity(queue_capacity));
    let config = McpHttpConfig {
        keepalive,
        cleanup_grace,
        ..McpHttpConfig::default()
    };
    let server = McpHttpServer::new(Dispatcher::new(Arc::new(service)), Arc::clone(&registry), config);

    TestApp {
        router: server.build_router(),
        registry,
        api_key,
    }
}

pub async fn default_app() -> TestApp {
    spawn_app(Duration::from_secs(30), Duration::from_secs(5)).await
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value, api_key: Option<&str>) -> axum::response::Response {
        self.post_raw(uri, body.to_string(), api_key).await
    }

    pub async fn post_raw(&self, uri: &str, body: String, api_key: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    /// Open an SSE stream for `client` and return it with its intake path.
    pub async fn open_stream(&self, client: &str) -> (SseReader, String) {
        let response = self
            .get(&format!("/mcp/{}/sse?key={}", client, self.api_key))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut reader = SseReader::new(response.into_body());
        let first = reader.next_event().await;
        assert_eq!(first.event.as_deref(), Some("endpoint"), "first frame must be the endpoint");
        (reader, first.data)
    }
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub comment: Option<String>,
}

impl SseEvent {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("event data should be JSON")
    }

    pub fn is_keepalive(&self) -> bool {
        self.event.is_none() && self.comment.is_some()
    }
}

/// Incremental reader for an SSE response body.
pub struct SseReader {
    body: Body,
    buffer: String,
}

impl SseReader {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            buffer: String::new(),
        }
    }

    pub async fn next_event(&mut self) -> SseEvent {
        tokio::time::timeout(Duration::from_secs(5), self.read_event())
            .await
            .expect("timed out waiting for an SSE event")
    }

    async fn read_event(&mut self) -> SseEvent {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                return parse_event(&raw);
            }
            let frame = self
                .body
                .frame()
                .await
                .expect("stream ended")
                .expect("body error");
            if let Ok(data) = frame.into_data() {
                let data: Bytes = data;
                self.buffer.push_str(std::str::from_utf8(&data).unwrap());
            }
        }
    }
}

fn parse_event(raw: &str) -> SseEvent {
    let mut event = None;
    let mut data = Vec::new();
    let mut comment = None;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix(':') {
            comment = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }
    SseEvent {
        event,
        data: data.join("\n"),
        comment,
    }
}
