//! Null search index implementation.
//!
//! Used when similarity search is disabled. Every call reports the index as
//! unavailable so callers take their storage fallback path.

use async_trait::async_trait;
use uuid::Uuid;

use super::search_index::{IndexEntry, SearchHit, SearchIndex};
use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Default)]
pub struct NullSearchIndex;

impl NullSearchIndex {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> DomainError {
        DomainError::SearchUnavailable("similarity search is disabled".to_string())
    }
}

#[async_trait]
impl SearchIndex for NullSearchIndex {
    fn name(&self) -> &'static str {
        "null"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn add(&self, _entry: &IndexEntry) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn query(
        &self,
        _user_id: &str,
        _app_id: Uuid,
        _text: &str,
        _limit: usize,
    ) -> DomainResult<Vec<SearchHit>> {
        Err(Self::unavailable())
    }

    async fn delete(&self, _user_id: &str, _memory_id: Uuid) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn delete_all(&self, _user_id: &str, _app_id: Uuid) -> DomainResult<()> {
        Err(Self::unavailable())
    }
}
