//! Memory record domain model.
//!
//! A memory is a piece of free text owned by a user and filed under one of
//! that user's apps. Records are never physically removed by the service;
//! deletion flips the state to `Deleted` and stamps `deleted_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::Scope;

/// Lifecycle state of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryState {
    Active,
    Paused,
    Archived,
    Deleted,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::Active
    }
}

impl MemoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    /// Internal id of the owning user.
    pub user_id: Uuid,
    /// App the memory was filed under.
    pub app_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub state: MemoryState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// Create a new active memory inside the given scope.
    pub fn new(scope: &Scope, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: scope.user_id,
            app_id: scope.app_id,
            content: content.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            state: MemoryState::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate the memory before persisting.
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("Memory content cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state == MemoryState::Active
    }
}
