//! SQLite implementation of the IdentityRepository.
//!
//! API keys look like `mem_lab_<24 lowercase alphanumerics>`. Only the
//! SHA-256 hex digest is stored.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{App, Provisioned, User};
use crate::domain::ports::IdentityRepository;

const API_KEY_PREFIX: &str = "mem_lab_";
const API_KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const API_KEY_RANDOM_LEN: usize = 24;

/// Generate a fresh plaintext API key.
pub fn generate_api_key() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..API_KEY_RANDOM_LEN)
        .map(|_| API_KEY_CHARSET[rng.gen_range(0..API_KEY_CHARSET.len())] as char)
        .collect();
    format!("{API_KEY_PREFIX}{suffix}")
}

/// One-way hash under which a key is stored and looked up.
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

#[derive(Clone)]
pub struct SqliteIdentityRepository {
    pool: SqlitePool,
}

impl SqliteIdentityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl IdentityRepository for SqliteIdentityRepository {
    async fn validate(&self, api_key: &str) -> DomainResult<Option<User>> {
        let key_hash = hash_api_key(api_key);

        let row: Option<UserRow> = sqlx::query_as(
            r#"SELECT u.id, u.user_id, u.name, u.email, u.created_at, u.last_active
               FROM api_keys k INNER JOIN users u ON u.id = k.user_id
               WHERE k.key_hash = ? AND k.is_active = 1"#,
        )
        .bind(&key_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let now = Utc::now();
        let now_str = format_datetime(&now);
        sqlx::query("UPDATE api_keys SET last_used = ? WHERE key_hash = ?")
            .bind(&now_str)
            .bind(&key_hash)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE users SET last_active = ? WHERE id = ?")
            .bind(&now_str)
            .bind(&row.id)
            .execute(&self.pool)
            .await?;

        let mut user: User = row.try_into()?;
        user.last_active = Some(now);
        Ok(Some(user))
    }

    async fn find_user(&self, user_id: &str) -> DomainResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, user_id, name, email, created_at, last_active FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> DomainResult<(User, String)> {
        if user_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("user id cannot be empty".to_string()));
        }

        let mut user = User::new(user_id);
        user.name = name.map(str::to_string);
        user.email = email.map(str::to_string);
        let api_key = generate_api_key();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO users (id, user_id, name, email, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(format_datetime(&user.created_at))
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(DomainError::UserAlreadyExists(user_id.to_string()));
            }
            return Err(err.into());
        }

        sqlx::query(
            "INSERT INTO api_keys (id, user_id, key_hash, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.id.to_string())
        .bind(hash_api_key(&api_key))
        .bind(format_datetime(&Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((user, api_key))
    }

    async fn get_or_create_user(&self, user_id: &str) -> DomainResult<Provisioned> {
        if let Some(user) = self.find_user(user_id).await? {
            return Ok(Provisioned { user, new_api_key: None });
        }

        match self.create_user(user_id, None, None).await {
            Ok((user, api_key)) => Ok(Provisioned {
                user,
                new_api_key: Some(api_key),
            }),
            // Lost a race against a concurrent first call for the same user.
            Err(DomainError::UserAlreadyExists(_)) => {
                let user = self
                    .find_user(user_id)
                    .await?
                    .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))?;
                Ok(Provisioned { user, new_api_key: None })
            }
            Err(err) => Err(err),
        }
    }

    async fn ensure_app(&self, owner: &User, name: &str) -> DomainResult<App> {
        let candidate = App::new(name, owner.id);

        sqlx::query("INSERT OR IGNORE INTO apps (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(candidate.id.to_string())
            .bind(&candidate.name)
            .bind(owner.id.to_string())
            .bind(format_datetime(&candidate.created_at))
            .execute(&self.pool)
            .await?;

        let row: AppRow = sqlx::query_as(
            "SELECT id, name, owner_id, created_at FROM apps WHERE owner_id = ? AND name = ?",
        )
        .bind(owner.id.to_string())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_users(&self) -> DomainResult<Vec<(User, bool)>> {
        let rows: Vec<UserWithKeyRow> = sqlx::query_as(
            r#"SELECT u.id, u.user_id, u.name, u.email, u.created_at, u.last_active,
                      EXISTS (SELECT 1 FROM api_keys k WHERE k.user_id = u.id AND k.is_active = 1) AS has_key
               FROM users u
               ORDER BY u.created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let has_key = r.has_key != 0;
                let user: User = UserRow {
                    id: r.id,
                    user_id: r.user_id,
                    name: r.name,
                    email: r.email,
                    created_at: r.created_at,
                    last_active: r.last_active,
                }
                .try_into()?;
                Ok((user, has_key))
            })
            .collect()
    }

    async fn revoke_keys(&self, user_id: &str) -> DomainResult<u64> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))?;

        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE user_id = ? AND is_active = 1")
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    user_id: String,
    name: Option<String>,
    email: Option<String>,
    created_at: String,
    last_active: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserWithKeyRow {
    id: String,
    user_id: String,
    name: Option<String>,
    email: Option<String>,
    created_at: String,
    last_active: Option<String>,
    has_key: i64,
}

impl TryFrom<UserRow> for User {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&row.id)?,
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            created_at: parse_datetime(&row.created_at)?,
            last_active: parse_optional_datetime(row.last_active)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppRow {
    id: String,
    name: String,
    owner_id: String,
    created_at: String,
}

impl TryFrom<AppRow> for App {
    type Error = DomainError;

    fn try_from(row: AppRow) -> Result<Self, Self::Error> {
        Ok(App {
            id: parse_uuid(&row.id)?,
            name: row.name,
            owner_id: parse_uuid(&row.owner_id)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
