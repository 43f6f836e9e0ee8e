//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the adapters implement:
//! - MemoryRepository: durable storage of memories
//! - IdentityRepository: API key validation and user/app provisioning
//! - SearchIndex: best-effort similarity search

pub mod identity_repository;
pub mod memory_repository;
pub mod null_search;
pub mod search_index;

pub use identity_repository::IdentityRepository;
pub use memory_repository::MemoryRepository;
pub use null_search::NullSearchIndex;
pub use search_index::{IndexEntry, SearchHit, SearchIndex};
