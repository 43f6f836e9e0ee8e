//! Domain models.

pub mod config;
pub mod identity;
pub mod memory;

pub use config::{Config, DatabaseConfig, LoggingConfig, SearchConfig, ServerConfig};
pub use identity::{App, CallerIdentity, Provisioned, Scope, User};
pub use memory::{Memory, MemoryState};
