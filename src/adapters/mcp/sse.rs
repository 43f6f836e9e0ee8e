//! Per-connection SSE stream for an MCP session.
//!
//! The stream first announces the intake endpoint, then forwards queued
//! responses in order. When the queue stays empty for the keepalive interval
//! a comment frame is written instead. Dropping the stream (client gone, or
//! the stream ending on shutdown) marks the session draining and schedules
//! its removal after the grace period.

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::{OpenedSession, OutboundMessage, SessionRegistry};

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// Intake path for this session. Always the first frame.
    Endpoint(String),
    /// A JSON-RPC message.
    Message(OutboundMessage),
    /// Transport-only comment sent when idle.
    KeepAlive,
}

impl SseFrame {
    /// Wire representation of the frame.
    pub fn into_event(self) -> Event {
        match self {
            Self::Endpoint(path) => Event::default().event("endpoint").data(path),
            Self::Message(message) => Event::default()
                .event("message")
                .data(serde_json::to_string(&message).unwrap_or_default()),
            Self::KeepAlive => Event::default().comment("keepalive"),
        }
    }
}

/// Timing knobs for a session stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamTimings {
    /// Idle time after which a keepalive comment is written.
    pub keepalive: Duration,
    /// Time a session stays registered, draining, after its stream ends.
    pub cleanup_grace: Duration,
}

impl Default for StreamTimings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            cleanup_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Announcing,
    Streaming,
}

struct Connection {
    phase: Phase,
    endpoint: String,
    receiver: mpsc::Receiver<OutboundMessage>,
    keepalive: Duration,
    shutdown: CancellationToken,
    _cleanup: CleanupGuard,
}

/// Schedules session removal when the connection state is dropped, on every
/// exit path.
struct CleanupGuard {
    registry: Arc<SessionRegistry>,
    session_id: Uuid,
    grace: Duration,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.mark_draining(&self.session_id);
        tracing::info!(session_id = %self.session_id, "sse stream ended, session draining");

        let registry = Arc::clone(&self.registry);
        let session_id = self.session_id;
        let grace = self.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    registry.close(&session_id);
                });
            }
            Err(_) => {
                registry.close(&session_id);
            }
        }
    }
}

/// Build the frame stream for a freshly opened session.
pub fn session_stream(
    registry: Arc<SessionRegistry>,
    opened: OpenedSession,
    endpoint: String,
    timings: StreamTimings,
    shutdown: CancellationToken,
) -> impl Stream<Item = SseFrame> {
    let OpenedSession { session, receiver } = opened;

    let connection = Connection {
        phase: Phase::Announcing,
        endpoint,
        receiver,
        keepalive: timings.keepalive,
        shutdown,
        _cleanup: CleanupGuard {
            registry,
            session_id: session.id,
            grace: timings.cleanup_grace,
        },
    };

    stream::unfold(connection, |mut conn| async move {
        match conn.phase {
            Phase::Announcing => {
                conn.phase = Phase::Streaming;
                let frame = SseFrame::Endpoint(conn.endpoint.clone());
                Some((frame, conn))
            }
            Phase::Streaming => {
                let next = tokio::select! {
                    biased;
                    _ = conn.shutdown.cancelled() => return None,
                    next = tokio::time::timeout(conn.keepalive, conn.receiver.recv()) => next,
                };
                match next {
                    Ok(Some(message)) => Some((SseFrame::Message(message), conn)),
                    // Session removed from the registry.
                    Ok(None) => None,
                    Err(_) => Some((SseFrame::KeepAlive, conn)),
                }
            }
        }
    })
}
