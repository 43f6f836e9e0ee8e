//! Users, apps and the identities requests are executed under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal identifier.
    pub id: Uuid,
    /// External, human-chosen identifier (e.g. "alice").
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: None,
            email: None,
            created_at: Utc::now(),
            last_active: None,
        }
    }

    /// Display name, falling back to the external id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.user_id)
    }
}

/// An app owned by a user. Memories are filed under exactly one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl App {
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            created_at: Utc::now(),
        }
    }
}

/// Storage scope: the user and app a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub user_id: Uuid,
    pub app_id: Uuid,
}

/// The identity an RPC call runs under.
///
/// Built from a validated credential on the HTTP surface. `user_id` is the
/// external user id; the user row may not exist yet, in which case the first
/// write provisions it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    pub app: String,
    pub client: String,
}

impl CallerIdentity {
    pub fn new(
        user_id: impl Into<String>,
        app: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            app: app.into(),
            client: client.into(),
        }
    }
}

/// Outcome of a get-or-create lookup.
///
/// `new_api_key` carries the plaintext key only on the call that created the
/// user; it is never retrievable afterwards.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub user: User,
    pub new_api_key: Option<String>,
}
