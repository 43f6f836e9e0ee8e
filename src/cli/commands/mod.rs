//! CLI command implementations.

pub mod memories;
pub mod serve;
pub mod users;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::adapters::search::build_search_index;
use crate::adapters::sqlite::{
    initialize_database, PoolConfig, SqliteIdentityRepository, SqliteMemoryRepository,
};
use crate::domain::models::Config;
use crate::services::MemoryService;

pub type Service = MemoryService<SqliteMemoryRepository, SqliteIdentityRepository>;

/// Everything a command needs: configuration, an open database and the
/// memory service wired to it.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub service: Arc<Service>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let pool_config = PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        };
        let pool = initialize_database(&database_url(&config.database.path), Some(pool_config))
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        let search = build_search_index(&config.search).context("Failed to set up search index")?;
        tracing::debug!(index = search.name(), "search index ready");

        let service = MemoryService::new(
            Arc::new(SqliteMemoryRepository::new(pool.clone())),
            Arc::new(SqliteIdentityRepository::new(pool.clone())),
            search,
        )
        .with_default_app(config.default_app.clone());

        Ok(Self {
            config,
            pool,
            service: Arc::new(service),
        })
    }
}

/// SQLite URL for a database path, passing full URLs through unchanged.
pub fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{}", path)
    }
}
