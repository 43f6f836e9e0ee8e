//! Live MCP sessions and their outbound message queues.
//!
//! Each SSE connection owns exactly one session. The registry holds the
//! producer side of the session queue; the SSE stream holds the consumer.
//! Sessions move `Active -> Draining -> Closed`: draining once the stream has
//! ended and cleanup is scheduled, closed once removed from the map. Only
//! active sessions accept work.
//!
//! Queues are bounded. A client that keeps its connection open but stops
//! reading fills its queue, after which further requests are refused instead
//! of buffering without limit.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::domain::models::CallerIdentity;

/// A serialized JSON-RPC message waiting to be written to the stream.
pub type OutboundMessage = serde_json::Value;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Reserved slot in a session queue.
///
/// Holding one guarantees the eventual response can be queued without
/// blocking, whatever happens to the queue in the meantime.
pub type QueueSlot<'a> = mpsc::Permit<'a, OutboundMessage>;

/// Errors raised when addressing a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The id was malformed, never issued, or belongs to a session that is
    /// draining or already closed.
    #[error("Unknown or expired session: {0}")]
    UnknownSession(String),

    /// The session stopped accepting messages after it was looked up.
    #[error("Session {0} is no longer accepting messages")]
    SessionClosed(Uuid),

    /// The session queue is full because its client is not reading.
    #[error("Session {0} has too many undelivered messages")]
    QueueFull(Uuid),
}

/// Lifecycle state of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Stream connected; requests are accepted.
    Active = 0,
    /// Stream ended; the session is waiting out its grace period.
    Draining = 1,
    /// Removed from the registry.
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// One client connection and the identity its requests run under.
#[derive(Debug)]
pub struct Session {
    /// Session id, as advertised in the intake path.
    pub id: Uuid,
    /// Identity resolved from the credential that opened the stream.
    pub identity: CallerIdentity,
    /// When the stream was opened.
    pub created_at: DateTime<Utc>,
    state: AtomicU8,
    sender: mpsc::Sender<OutboundMessage>,
}

impl Session {
    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session still accepts requests.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Reserve room for one response before doing the work that produces it.
    ///
    /// Fails when the session is no longer active or its queue is full.
    pub fn reserve(&self) -> Result<QueueSlot<'_>, RegistryError> {
        if !self.is_active() {
            return Err(RegistryError::SessionClosed(self.id));
        }
        self.sender.try_reserve().map_err(|e| self.send_error(e))
    }

    /// Queue a message for the owning stream.
    ///
    /// Fails once the stream has ended, even if the session has not been
    /// removed from the registry yet, and when the queue is full.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), RegistryError> {
        if !self.is_active() {
            return Err(RegistryError::SessionClosed(self.id));
        }
        self.sender.try_send(message).map_err(|e| self.send_error(e))
    }

    fn send_error<T>(&self, error: TrySendError<T>) -> RegistryError {
        match error {
            TrySendError::Full(_) => RegistryError::QueueFull(self.id),
            TrySendError::Closed(_) => RegistryError::SessionClosed(self.id),
        }
    }

    fn transition(&self, to: SessionState) {
        // States only move forward.
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }
}

/// A newly opened session together with the consumer end of its queue.
pub struct OpenedSession {
    /// The registered session.
    pub session: Arc<Session>,
    /// Consumer end of the session queue, owned by the SSE stream.
    pub receiver: mpsc::Receiver<OutboundMessage>,
}

/// Concurrent map of live sessions, shared by every request handler.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
    queue_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SessionRegistry {
    /// Registry with the default queue capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose sessions buffer at most `capacity` undelivered messages.
    /// A capacity of zero is raised to one.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity: capacity.max(1),
        }
    }

    /// Allocate a session with a never-before-used id.
    pub fn open(&self, identity: CallerIdentity) -> OpenedSession {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        loop {
            let id = Uuid::new_v4();
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                let session = Arc::new(Session {
                    id,
                    identity,
                    created_at: Utc::now(),
                    state: AtomicU8::new(SessionState::Active as u8),
                    sender,
                });
                slot.insert(Arc::clone(&session));
                tracing::debug!(session_id = %id, "session opened");
                return OpenedSession { session, receiver };
            }
        }
    }

    /// Session by id, in whatever state it is in.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up an active session by the id as it appears in a request path.
    ///
    /// Draining sessions count as expired: their stream is gone, so work
    /// accepted for them could never be delivered.
    pub fn lookup(&self, raw_id: &str) -> Result<Arc<Session>, RegistryError> {
        Uuid::parse_str(raw_id)
            .ok()
            .and_then(|id| self.get(&id))
            .filter(|session| session.is_active())
            .ok_or_else(|| RegistryError::UnknownSession(raw_id.to_string()))
    }

    /// Flag a session whose stream has ended. Further enqueues fail.
    pub fn mark_draining(&self, id: &Uuid) {
        if let Some(session) = self.get(id) {
            session.transition(SessionState::Draining);
        }
    }

    /// Remove a session. Returns false if it was already gone.
    pub fn close(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.transition(SessionState::Closed);
                tracing::debug!(session_id = %id, "session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session. Used on server shutdown.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.close(id)).count()
    }

    /// Number of registered sessions, draining ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
