//! Router-level tests for the MCP HTTP/SSE surface.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use common::{default_app, json_body, spawn_app, spawn_app_with_queue, TestApp};

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health_and_root() {
    let app = default_app().await;

    let health = app.get("/health").await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(json_body(health).await, json!({ "status": "healthy" }));

    let root = json_body(app.get("/").await).await;
    assert_eq!(root["name"], "openmemory");
    assert_eq!(root["status"], "running");
}

#[tokio::test]
async fn test_stream_requires_valid_key() {
    let app = default_app().await;

    let missing = app.get("/mcp/claude/sse").await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(missing).await;
    assert_eq!(body["error"]["code"], -32002);

    let wrong = app.get("/mcp/claude/sse?key=mem_lab_not_a_real_key").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn test_stream_announces_intake_endpoint_first() {
    let app = default_app().await;

    let (_reader, endpoint) = app.open_stream("claude").await;

    let session_id = endpoint
        .strip_prefix("/mcp/messages/")
        .expect("endpoint should be an intake path");
    assert!(uuid::Uuid::parse_str(session_id).is_ok());
    assert_eq!(app.registry.len(), 1);
}

#[tokio::test]
async fn test_message_for_unknown_session_is_rejected() {
    let app = default_app().await;
    let request = json!({ "jsonrpc": "2.0", "id": 7, "method": "ping" });

    let unknown = format!("/mcp/messages/{}", uuid::Uuid::new_v4());
    let response = app.post_json(&unknown, request.clone(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["message"], "Invalid or expired session");

    let malformed = app.post_json("/mcp/messages/not-a-uuid", request, None).await;
    assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(malformed).await["error"]["code"], -32001);
}

#[tokio::test]
async fn test_responses_arrive_on_stream_in_order() {
    let app = default_app().await;
    let (mut reader, endpoint) = app.open_stream("claude").await;

    let init = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "protocolVersion": "2024-11-05", "capabilities": {} }
    });
    let ack = app.post_json(&endpoint, init, None).await;
    assert_eq!(ack.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(ack).await, json!({ "status": "accepted" }));

    let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    let ack = app.post_json(&endpoint, initialized, None).await;
    assert_eq!(ack.status(), StatusCode::ACCEPTED);

    let list = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" });
    assert_eq!(app.post_json(&endpoint, list, None).await.status(), StatusCode::ACCEPTED);

    let first = reader.next_event().await;
    assert_eq!(first.event.as_deref(), Some("message"));
    let first = first.json();
    assert_eq!(first["id"], 1);
    assert_eq!(first["result"]["serverInfo"]["name"], "openmemory");
    assert_eq!(first["result"]["protocolVersion"], "2024-11-05");

    // The notification produced nothing, so the next frame answers tools/list.
    let second = reader.next_event().await.json();
    assert_eq!(second["id"], 2);
    let names: Vec<&str> = second["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["add_memory", "search_memories", "list_memories"]);
}

#[tokio::test]
async fn test_tool_calls_over_stream_use_session_identity() {
    let app = default_app().await;
    let (mut reader, endpoint) = app.open_stream("claude").await;

    let add = tool_call(1, "add_memory", json!({ "text": "prefers tea over coffee" }));
    app.post_json(&endpoint, add, None).await;
    let added = reader.next_event().await.json();
    assert!(tool_text(&added).starts_with("Memory added successfully"));
    assert!(!tool_text(&added).contains("API key"), "existing users never see a key");

    let list = tool_call(2, "list_memories", json!({}));
    app.post_json(&endpoint, list, None).await;
    let listed = reader.next_event().await.json();
    assert!(tool_text(&listed).starts_with("Your 1 most recent memories:"));
    assert!(tool_text(&listed).contains("prefers tea over coffee"));

    let search = tool_call(3, "search_memories", json!({ "query": "TEA" }));
    app.post_json(&endpoint, search, None).await;
    let found = reader.next_event().await.json();
    assert_eq!(tool_text(&found), "Found 1 memories:\n1. prefers tea over coffee");
}

#[tokio::test]
async fn test_malformed_message_is_rejected_synchronously() {
    let app = default_app().await;
    let (_reader, endpoint) = app.open_stream("claude").await;

    let response = app.post_raw(&endpoint, "{not json".to_string(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], -32700);

    let wrong_version = json!({ "jsonrpc": "1.0", "id": 4, "method": "ping" });
    let response = app.post_json(&endpoint, wrong_version, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 4);
}

#[tokio::test]
async fn test_keepalive_sent_when_idle() {
    let app = spawn_app(Duration::from_millis(50), Duration::from_secs(5)).await;
    let (mut reader, _endpoint) = app.open_stream("claude").await;

    let frame = reader.next_event().await;
    assert!(frame.is_keepalive(), "expected keepalive, got {:?}", frame);
}

#[tokio::test]
async fn test_session_expires_after_stream_drops() {
    let app = spawn_app(Duration::from_secs(30), Duration::from_millis(50)).await;
    let (reader, endpoint) = app.open_stream("claude").await;
    assert_eq!(app.registry.len(), 1);

    drop(reader);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(app.registry.is_empty());
    let ping = json!({ "jsonrpc": "2.0", "id": 9, "method": "ping" });
    let response = app.post_json(&endpoint, ping, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], -32001);
}

async fn stored_memories_text(app: &TestApp) -> String {
    let key = app.api_key.clone();
    let list = tool_call(99, "list_memories", json!({}));
    let body = json_body(app.post_json("/mcp/rpc", list, Some(&key)).await).await;
    tool_text(&body).to_string()
}

#[tokio::test]
async fn test_draining_session_does_not_execute_requests() {
    let app = spawn_app(Duration::from_secs(30), Duration::from_secs(5)).await;
    let (reader, endpoint) = app.open_stream("claude").await;

    drop(reader);
    assert_eq!(app.registry.len(), 1, "session is still within its grace period");

    let add = tool_call(5, "add_memory", json!({ "text": "written after disconnect" }));
    let response = app.post_json(&endpoint, add, None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["id"], 5);
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(stored_memories_text(&app).await, "You have no stored memories yet.");
}

#[tokio::test]
async fn test_full_queue_rejects_without_executing() {
    let app = spawn_app_with_queue(Duration::from_secs(30), Duration::from_secs(5), 1).await;
    let (mut reader, endpoint) = app.open_stream("claude").await;

    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    assert_eq!(app.post_json(&endpoint, ping, None).await.status(), StatusCode::ACCEPTED);

    let add = tool_call(2, "add_memory", json!({ "text": "should not be stored" }));
    let response = app.post_json(&endpoint, add, None).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["id"], 2);
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(stored_memories_text(&app).await, "You have no stored memories yet.");

    // Reading drains the queue and the session accepts work again.
    assert_eq!(reader.next_event().await.json()["id"], 1);
    let ping = json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" });
    assert_eq!(app.post_json(&endpoint, ping, None).await.status(), StatusCode::ACCEPTED);
    assert_eq!(reader.next_event().await.json()["id"], 3);
}

#[tokio::test]
async fn test_direct_rpc_requires_key() {
    let app = default_app().await;
    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });

    let response = app.post_json("/mcp/rpc", ping, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], -32002);
}

#[tokio::test]
async fn test_direct_rpc_answers_inline() {
    let app = default_app().await;
    let key = app.api_key.clone();

    let unknown = json!({ "jsonrpc": "2.0", "id": "a", "method": "resources/list" });
    let response = app.post_json("/mcp/rpc", unknown, Some(&key)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], "a");
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["error"]["message"], "Method not found: resources/list");

    let search = tool_call(2, "search_memories", json!({ "query": "anything" }));
    let body = json_body(app.post_json("/mcp/rpc", search, Some(&key)).await).await;
    assert_eq!(tool_text(&body), "No memories found matching 'anything'.");

    let unknown_tool = tool_call(3, "delete_everything", json!({}));
    let body = json_body(app.post_json("/mcp/rpc", unknown_tool, Some(&key)).await).await;
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["error"]["message"], "Unknown tool: delete_everything");

    let bad_limit = tool_call(4, "list_memories", json!({ "limit": 0 }));
    let body = json_body(app.post_json("/mcp/rpc", bad_limit, Some(&key)).await).await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn test_direct_rpc_notification_has_empty_body() {
    let app = default_app().await;
    let key = app.api_key.clone();
    let note = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });

    let response = app.post_json("/mcp/rpc", note, Some(&key)).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_streams_are_isolated_per_session() {
    let app = default_app().await;
    let (mut first, first_endpoint) = app.open_stream("claude").await;
    let (mut second, second_endpoint) = app.open_stream("cursor").await;
    assert_ne!(first_endpoint, second_endpoint);

    app.post_json(&second_endpoint, json!({ "jsonrpc": "2.0", "id": 20, "method": "ping" }), None)
        .await;
    app.post_json(&first_endpoint, json!({ "jsonrpc": "2.0", "id": 10, "method": "ping" }), None)
        .await;

    assert_eq!(first.next_event().await.json()["id"], 10);
    assert_eq!(second.next_event().await.json()["id"], 20);
}
