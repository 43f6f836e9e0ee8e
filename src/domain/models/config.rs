use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the OpenMemory service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// HTTP/SSE server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Similarity search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// App name memories are filed under when the caller does not name one
    #[serde(default = "default_app")]
    pub default_app: String,
}

fn default_app() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            search: SearchConfig::default(),
            default_app: default_app(),
        }
    }
}

/// HTTP/SSE server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Idle time after which an SSE stream emits a keepalive
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Delay between an SSE stream ending and its session being removed
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,

    /// Prefix prepended to advertised intake paths (for reverse proxies)
    #[serde(default)]
    pub public_base_path: String,

    /// Responses a session may hold before its client reads them
    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8765
}

const fn default_true() -> bool {
    true
}

const fn default_keepalive_secs() -> u64 {
    30
}

const fn default_cleanup_grace_secs() -> u64 {
    5
}

const fn default_session_queue_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            keepalive_secs: default_keepalive_secs(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
            public_base_path: String::new(),
            session_queue_capacity: default_session_queue_capacity(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".openmemory/openmemory.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Similarity search configuration (Qdrant + Ollama embeddings)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// When false, search always falls back to substring matching
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "openmemory".to_string()
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            qdrant_url: default_qdrant_url(),
            qdrant_api_key: None,
            collection: default_collection(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
