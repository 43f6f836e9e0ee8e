//! Memory operations behind the MCP tools.
//!
//! Storage is the source of truth. The search index is a best-effort copy:
//! failures to index or delete are logged and swallowed, and a failing query
//! falls back to substring matching in storage.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CallerIdentity, Memory, Scope, User};
use crate::domain::ports::{IdentityRepository, IndexEntry, MemoryRepository, SearchIndex};

/// Result of storing a memory.
#[derive(Debug, Clone)]
pub struct AddedMemory {
    pub memory: Memory,
    /// Plaintext API key, present only when this call provisioned the user.
    pub new_api_key: Option<String>,
}

/// A search match, from the similarity index or the storage fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub memory_id: Uuid,
    pub content: String,
    /// Similarity score; `None` for substring matches.
    pub score: Option<f32>,
}

/// A provisioned user as shown by administrative listings.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub user: User,
    pub has_active_key: bool,
    /// Memories stored across all of the user's apps, forgotten ones included.
    pub memories: u64,
}

pub struct MemoryService<M: MemoryRepository, I: IdentityRepository> {
    memories: Arc<M>,
    identities: Arc<I>,
    search: Arc<dyn SearchIndex>,
    default_app: String,
}

impl<M: MemoryRepository, I: IdentityRepository> MemoryService<M, I> {
    pub fn new(memories: Arc<M>, identities: Arc<I>, search: Arc<dyn SearchIndex>) -> Self {
        Self {
            memories,
            identities,
            search,
            default_app: "default".to_string(),
        }
    }

    pub fn with_default_app(mut self, app: impl Into<String>) -> Self {
        self.default_app = app.into();
        self
    }

    pub fn identities(&self) -> &Arc<I> {
        &self.identities
    }

    fn app_name<'a>(&'a self, caller: &'a CallerIdentity) -> &'a str {
        if caller.app.trim().is_empty() {
            &self.default_app
        } else {
            &caller.app
        }
    }

    /// Scope of an existing user, or `None` if the user was never provisioned.
    async fn existing_scope(&self, caller: &CallerIdentity) -> DomainResult<Option<Scope>> {
        let Some(user) = self.identities.find_user(&caller.user_id).await? else {
            return Ok(None);
        };
        let app = self.identities.ensure_app(&user, self.app_name(caller)).await?;
        Ok(Some(Scope {
            user_id: user.id,
            app_id: app.id,
        }))
    }

    /// Store a memory, provisioning the caller on first use.
    pub async fn add_memory(&self, caller: &CallerIdentity, text: &str) -> DomainResult<AddedMemory> {
        let provisioned = self.identities.get_or_create_user(&caller.user_id).await?;
        if provisioned.new_api_key.is_some() {
            tracing::info!(user_id = %caller.user_id, "provisioned new user on first write");
        }

        let app = self
            .identities
            .ensure_app(&provisioned.user, self.app_name(caller))
            .await?;
        let scope = Scope {
            user_id: provisioned.user.id,
            app_id: app.id,
        };

        let memory = Memory::new(&scope, text).with_metadata(serde_json::json!({
            "source_client": caller.client,
        }));
        memory.validate().map_err(DomainError::ValidationFailed)?;
        self.memories.create(&memory).await?;

        let entry = IndexEntry {
            memory_id: memory.id,
            user_id: caller.user_id.clone(),
            app_id: app.id,
            content: memory.content.clone(),
            created_at: memory.created_at,
        };
        if self.search.is_enabled() {
            if let Err(e) = self.search.add(&entry).await {
                tracing::warn!(
                    memory_id = %memory.id,
                    index = self.search.name(),
                    error = %e,
                    "failed to index memory, continuing without it"
                );
            }
        }

        tracing::info!(memory_id = %memory.id, user_id = %caller.user_id, "memory added");

        Ok(AddedMemory {
            memory,
            new_api_key: provisioned.new_api_key,
        })
    }

    /// Similarity search with a storage fallback on any index fault.
    ///
    /// Index hits are confined to the caller's app and re-checked against
    /// storage, so entries the index still holds for forgotten memories
    /// never surface.
    pub async fn search_memories(
        &self,
        caller: &CallerIdentity,
        query: &str,
        limit: usize,
    ) -> DomainResult<Vec<MemoryMatch>> {
        let Some(scope) = self.existing_scope(caller).await? else {
            return Ok(Vec::new());
        };

        match self.search.query(&caller.user_id, scope.app_id, query, limit).await {
            Ok(hits) => {
                let mut matches = Vec::with_capacity(hits.len().min(limit));
                for hit in hits {
                    if matches.len() == limit {
                        break;
                    }
                    let Some(memory) = self.memories.get(&scope, hit.memory_id).await? else {
                        tracing::debug!(memory_id = %hit.memory_id, "dropping stale index hit");
                        continue;
                    };
                    matches.push(MemoryMatch {
                        memory_id: memory.id,
                        content: memory.content,
                        score: Some(hit.score),
                    });
                }
                return Ok(matches);
            }
            Err(e) => {
                tracing::debug!(
                    index = self.search.name(),
                    error = %e,
                    "similarity search unavailable, falling back to substring match"
                );
            }
        }

        let memories = self.memories.search_substring(&scope, query, limit).await?;
        Ok(memories
            .into_iter()
            .map(|m| MemoryMatch {
                memory_id: m.id,
                content: m.content,
                score: None,
            })
            .collect())
    }

    /// The caller's most recent memories, newest first.
    pub async fn list_memories(&self, caller: &CallerIdentity, limit: usize) -> DomainResult<Vec<Memory>> {
        let Some(scope) = self.existing_scope(caller).await? else {
            return Ok(Vec::new());
        };
        self.memories.list_recent(&scope, limit).await
    }

    /// Soft-delete a memory and drop it from the index.
    pub async fn forget(&self, caller: &CallerIdentity, memory_id: Uuid) -> DomainResult<()> {
        let scope = self
            .existing_scope(caller)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(caller.user_id.clone()))?;

        self.memories.soft_delete(&scope, memory_id).await?;

        if !self.search.is_enabled() {
            return Ok(());
        }
        if let Err(e) = self.search.delete(&caller.user_id, memory_id).await {
            tracing::warn!(
                memory_id = %memory_id,
                index = self.search.name(),
                error = %e,
                "failed to remove memory from index"
            );
        }
        Ok(())
    }

    /// Soft-delete every memory the caller holds in one app.
    ///
    /// Returns how many memories were forgotten. Index cleanup failures are
    /// logged and swallowed like in [`forget`](Self::forget).
    pub async fn forget_all(&self, caller: &CallerIdentity) -> DomainResult<u64> {
        let scope = self
            .existing_scope(caller)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(caller.user_id.clone()))?;

        let forgotten = self.memories.soft_delete_all(&scope).await?;
        tracing::info!(user_id = %caller.user_id, app_id = %scope.app_id, forgotten, "memories forgotten");

        if !self.search.is_enabled() {
            return Ok(forgotten);
        }
        if let Err(e) = self.search.delete_all(&caller.user_id, scope.app_id).await {
            tracing::warn!(
                user_id = %caller.user_id,
                index = self.search.name(),
                error = %e,
                "failed to clear memories from index"
            );
        }
        Ok(forgotten)
    }

    /// Every user with key state and stored memory count.
    pub async fn user_summaries(&self) -> DomainResult<Vec<UserSummary>> {
        let users = self.identities.list_users().await?;
        let mut summaries = Vec::with_capacity(users.len());
        for (user, has_active_key) in users {
            let memories = self.memories.count_for_user(user.id).await?;
            summaries.push(UserSummary {
                user,
                has_active_key,
                memories,
            });
        }
        Ok(summaries)
    }
}

/// Timestamp as shown in tool output.
pub fn display_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteIdentityRepository, SqliteMemoryRepository,
    };
    use crate::domain::ports::{NullSearchIndex, SearchHit};
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Service = MemoryService<SqliteMemoryRepository, SqliteIdentityRepository>;

    async fn service_with(search: Arc<dyn SearchIndex>) -> Service {
        let pool = create_migrated_test_pool().await.unwrap();
        MemoryService::new(
            Arc::new(SqliteMemoryRepository::new(pool.clone())),
            Arc::new(SqliteIdentityRepository::new(pool)),
            search,
        )
    }

    fn caller() -> CallerIdentity {
        CallerIdentity::new("alice", "default", "test")
    }

    /// Records adds and scope clears, and answers queries with canned hits.
    #[derive(Default)]
    struct RecordingIndex {
        added: Mutex<Vec<IndexEntry>>,
        cleared: Mutex<Vec<(String, Uuid)>>,
        hits: Vec<SearchHit>,
        fail_deletes: bool,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn add(&self, entry: &IndexEntry) -> DomainResult<()> {
            self.added.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn query(
            &self,
            _user_id: &str,
            _app_id: Uuid,
            _text: &str,
            _limit: usize,
        ) -> DomainResult<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }

        async fn delete(&self, _user_id: &str, _memory_id: Uuid) -> DomainResult<()> {
            Ok(())
        }

        async fn delete_all(&self, user_id: &str, app_id: Uuid) -> DomainResult<()> {
            if self.fail_deletes {
                return Err(DomainError::SearchUnavailable("index offline".to_string()));
            }
            self.cleared.lock().unwrap().push((user_id.to_string(), app_id));
            Ok(())
        }
    }

    fn hit(memory_id: Uuid, content: &str, score: f32) -> SearchHit {
        SearchHit {
            memory_id,
            content: content.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_first_add_discloses_key_once() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;

        let first = service.add_memory(&caller(), "hello").await.unwrap();
        let second = service.add_memory(&caller(), "again").await.unwrap();

        let key = first.new_api_key.expect("first write should provision the user");
        assert!(key.starts_with("mem_lab_"));
        assert!(second.new_api_key.is_none());
        assert_ne!(first.memory.id, second.memory.id);
    }

    #[tokio::test]
    async fn test_add_rejects_blank_text() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;

        let result = service.add_memory(&caller(), "  ").await;

        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_add_indexes_with_external_user_id() {
        let index = Arc::new(RecordingIndex::default());
        let service = service_with(index.clone()).await;

        let added = service.add_memory(&caller(), "likes tea").await.unwrap();

        let entries = index.added.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].memory_id, added.memory.id);
        assert_eq!(entries[0].user_id, "alice");
    }

    #[tokio::test]
    async fn test_search_uses_index_hits_when_available() {
        let seed = service_with(Arc::new(NullSearchIndex::new())).await;
        let stored = seed.add_memory(&caller(), "likes tea").await.unwrap().memory;
        let index = Arc::new(RecordingIndex {
            hits: vec![hit(stored.id, "likes tea", 0.9)],
            ..RecordingIndex::default()
        });
        let service = MemoryService::new(seed.memories.clone(), seed.identities.clone(), index);

        let matches = service.search_memories(&caller(), "tea", 10).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].memory_id, stored.id);
        assert_eq!(matches[0].content, "likes tea");
        assert_eq!(matches[0].score, Some(0.9));
    }

    #[tokio::test]
    async fn test_search_drops_hits_missing_from_storage() {
        let seed = service_with(Arc::new(NullSearchIndex::new())).await;
        let kept = seed.add_memory(&caller(), "likes green tea").await.unwrap().memory;
        let forgotten = seed.add_memory(&caller(), "liked black tea").await.unwrap().memory;
        seed.forget(&caller(), forgotten.id).await.unwrap();
        let other_app = seed
            .add_memory(&CallerIdentity::new("alice", "work", "test"), "tea at the office")
            .await
            .unwrap()
            .memory;

        let index = Arc::new(RecordingIndex {
            hits: vec![
                hit(forgotten.id, "liked black tea", 0.95),
                hit(other_app.id, "tea at the office", 0.9),
                hit(kept.id, "likes green tea", 0.8),
                hit(Uuid::new_v4(), "never stored", 0.7),
            ],
            ..RecordingIndex::default()
        });
        let service = MemoryService::new(seed.memories.clone(), seed.identities.clone(), index);

        let matches = service.search_memories(&caller(), "tea", 10).await.unwrap();

        let ids: Vec<_> = matches.iter().map(|m| m.memory_id).collect();
        assert_eq!(ids, vec![kept.id]);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_storage() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        service.add_memory(&caller(), "Loves green tea").await.unwrap();
        service.add_memory(&caller(), "Drives a bike").await.unwrap();

        let matches = service.search_memories(&caller(), "TEA", 10).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "Loves green tea");
        assert_eq!(matches[0].score, None);
    }

    #[tokio::test]
    async fn test_reads_for_unknown_user_are_empty_and_do_not_provision() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        let stranger = CallerIdentity::new("nobody", "default", "test");

        assert!(service.search_memories(&stranger, "x", 10).await.unwrap().is_empty());
        assert!(service.list_memories(&stranger, 10).await.unwrap().is_empty());
        assert!(service.identities().find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apps_partition_memories() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        let work = CallerIdentity::new("alice", "work", "test");
        service.add_memory(&caller(), "personal note").await.unwrap();
        service.add_memory(&work, "work note").await.unwrap();

        let listed = service.list_memories(&work, 10).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "work note");
    }

    #[tokio::test]
    async fn test_forget_hides_memory() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        let added = service.add_memory(&caller(), "temporary").await.unwrap();

        service.forget(&caller(), added.memory.id).await.unwrap();

        assert!(service.list_memories(&caller(), 10).await.unwrap().is_empty());
        assert!(matches!(
            service.forget(&caller(), added.memory.id).await,
            Err(DomainError::MemoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_forget_all_clears_app_and_index() {
        let index = Arc::new(RecordingIndex::default());
        let service = service_with(index.clone()).await;
        let work = CallerIdentity::new("alice", "work", "test");
        service.add_memory(&caller(), "one").await.unwrap();
        service.add_memory(&caller(), "two").await.unwrap();
        service.add_memory(&work, "work note").await.unwrap();

        let forgotten = service.forget_all(&caller()).await.unwrap();

        assert_eq!(forgotten, 2);
        assert!(service.list_memories(&caller(), 10).await.unwrap().is_empty());
        assert_eq!(service.list_memories(&work, 10).await.unwrap().len(), 1);
        let cleared = index.cleared.lock().unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].0, "alice");
    }

    #[tokio::test]
    async fn test_forget_all_survives_index_failure() {
        let index = Arc::new(RecordingIndex {
            fail_deletes: true,
            ..RecordingIndex::default()
        });
        let service = service_with(index).await;
        service.add_memory(&caller(), "one").await.unwrap();

        assert_eq!(service.forget_all(&caller()).await.unwrap(), 1);
        assert!(service.list_memories(&caller(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forget_all_unknown_user() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        let stranger = CallerIdentity::new("nobody", "default", "test");

        assert!(matches!(
            service.forget_all(&stranger).await,
            Err(DomainError::UserNotFound(user)) if user == "nobody"
        ));
    }

    #[tokio::test]
    async fn test_user_summaries_count_memories_across_apps() {
        let service = service_with(Arc::new(NullSearchIndex::new())).await;
        let work = CallerIdentity::new("alice", "work", "test");
        service.add_memory(&caller(), "one").await.unwrap();
        let gone = service.add_memory(&work, "two").await.unwrap();
        service.add_memory(&work, "three").await.unwrap();
        service.forget(&work, gone.memory.id).await.unwrap();

        let summaries = service.user_summaries().await.unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].user.user_id, "alice");
        assert!(summaries[0].has_active_key);
        assert_eq!(summaries[0].memories, 3);
    }

    #[test]
    fn test_display_timestamp_format() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T09:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(display_timestamp(&at), "2024-03-01 09:05:00 UTC");
    }
}
