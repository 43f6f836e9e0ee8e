//! Similarity search adapters.

pub mod qdrant;

pub use qdrant::QdrantSearchIndex;

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::SearchConfig;
use crate::domain::ports::{NullSearchIndex, SearchIndex};

/// Build the configured search index, or the null index when search is disabled.
pub fn build_search_index(config: &SearchConfig) -> DomainResult<Arc<dyn SearchIndex>> {
    if config.enabled {
        Ok(Arc::new(QdrantSearchIndex::new(config.clone())?))
    } else {
        Ok(Arc::new(NullSearchIndex::new()))
    }
}
