//! OpenMemory - multi-user memory service for MCP clients
//!
//! Exposes a small set of memory tools (`add_memory`, `search_memories`,
//! `list_memories`) over the Model Context Protocol. JSON-RPC requests arrive
//! by HTTP POST and their responses are pushed back over a per-session
//! Server-Sent Events stream.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): memory operations and the session registry
//! - **Adapters** (`adapters`): SQLite storage, Qdrant search, the MCP HTTP/SSE surface
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{CallerIdentity, Config, Memory, MemoryState, User};
pub use domain::{DomainError, DomainResult};
pub use services::{MemoryService, SessionRegistry};
