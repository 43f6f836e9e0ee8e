//! Infrastructure adapters for external systems.

pub mod mcp;
pub mod search;
pub mod sqlite;
