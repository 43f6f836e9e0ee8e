use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Memory, Scope};

/// Repository trait for memory storage operations
///
/// Every read and write is confined to a [`Scope`] (user + app). Deleted
/// memories are soft-deleted and never returned by `get`, `list_recent` or
/// `search_substring`.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Persist a new memory.
    async fn create(&self, memory: &Memory) -> DomainResult<()>;

    /// Get an active memory by id within a scope.
    async fn get(&self, scope: &Scope, id: Uuid) -> DomainResult<Option<Memory>>;

    /// The `limit` most recent active memories, newest first.
    async fn list_recent(&self, scope: &Scope, limit: usize) -> DomainResult<Vec<Memory>>;

    /// Case-insensitive substring match over content, newest first.
    async fn search_substring(
        &self,
        scope: &Scope,
        query: &str,
        limit: usize,
    ) -> DomainResult<Vec<Memory>>;

    /// Mark a memory deleted.
    ///
    /// # Errors
    /// Returns `MemoryNotFound` if no active memory with that id exists in scope.
    async fn soft_delete(&self, scope: &Scope, id: Uuid) -> DomainResult<()>;

    /// Mark every active memory in scope deleted, returning how many were.
    async fn soft_delete_all(&self, scope: &Scope) -> DomainResult<u64>;

    /// Number of memories ever stored by a user, deleted ones included.
    async fn count_for_user(&self, user_id: Uuid) -> DomainResult<u64>;
}
