//! Similarity search port.
//!
//! The index is a best-effort secondary copy of storage. Callers treat every
//! error as "index unavailable" and carry on with storage alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// A memory as handed to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub memory_id: Uuid,
    /// External user id the entry is filtered by.
    pub user_id: String,
    pub app_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A similarity match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub memory_id: Uuid,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend name for logs (e.g. "qdrant", "null").
    fn name(&self) -> &'static str;

    /// False for indexes that never hold data; callers skip writes to them.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Index a memory.
    async fn add(&self, entry: &IndexEntry) -> DomainResult<()>;

    /// Best matches for `text` among the entries of one user's app, best first.
    async fn query(
        &self,
        user_id: &str,
        app_id: Uuid,
        text: &str,
        limit: usize,
    ) -> DomainResult<Vec<SearchHit>>;

    /// Remove a memory from the index.
    async fn delete(&self, user_id: &str, memory_id: Uuid) -> DomainResult<()>;

    /// Remove every entry of one user's app.
    async fn delete_all(&self, user_id: &str, app_id: Uuid) -> DomainResult<()>;
}
