//! SQLite implementation of the MemoryRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Memory, MemoryState, Scope};
use crate::domain::ports::MemoryRepository;

#[derive(Clone)]
pub struct SqliteMemoryRepository {
    pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn create(&self, memory: &Memory) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&memory.metadata)?;

        sqlx::query(
            r#"INSERT INTO memories (id, user_id, app_id, content, metadata, state,
               created_at, updated_at, deleted_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(memory.id.to_string())
        .bind(memory.user_id.to_string())
        .bind(memory.app_id.to_string())
        .bind(&memory.content)
        .bind(&metadata_json)
        .bind(memory.state.as_str())
        .bind(format_datetime(&memory.created_at))
        .bind(format_datetime(&memory.updated_at))
        .bind(memory.deleted_at.as_ref().map(format_datetime))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, scope: &Scope, id: Uuid) -> DomainResult<Option<Memory>> {
        let row: Option<MemoryRow> = sqlx::query_as(
            "SELECT * FROM memories WHERE id = ? AND user_id = ? AND app_id = ? AND state != 'deleted'",
        )
        .bind(id.to_string())
        .bind(scope.user_id.to_string())
        .bind(scope.app_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_recent(&self, scope: &Scope, limit: usize) -> DomainResult<Vec<Memory>> {
        let rows: Vec<MemoryRow> = sqlx::query_as(
            r#"SELECT * FROM memories
               WHERE user_id = ? AND app_id = ? AND state = 'active'
               ORDER BY created_at DESC, rowid DESC
               LIMIT ?"#,
        )
        .bind(scope.user_id.to_string())
        .bind(scope.app_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn search_substring(
        &self,
        scope: &Scope,
        query: &str,
        limit: usize,
    ) -> DomainResult<Vec<Memory>> {
        let pattern = like_pattern(query);

        let rows: Vec<MemoryRow> = sqlx::query_as(
            r#"SELECT * FROM memories
               WHERE user_id = ? AND app_id = ? AND state = 'active'
                 AND content LIKE ? ESCAPE '\'
               ORDER BY created_at DESC, rowid DESC
               LIMIT ?"#,
        )
        .bind(scope.user_id.to_string())
        .bind(scope.app_id.to_string())
        .bind(&pattern)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn soft_delete(&self, scope: &Scope, id: Uuid) -> DomainResult<()> {
        let now = format_datetime(&Utc::now());

        let result = sqlx::query(
            r#"UPDATE memories SET state = 'deleted', deleted_at = ?, updated_at = ?
               WHERE id = ? AND user_id = ? AND app_id = ? AND state != 'deleted'"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .bind(scope.user_id.to_string())
        .bind(scope.app_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MemoryNotFound(id));
        }

        Ok(())
    }

    async fn soft_delete_all(&self, scope: &Scope) -> DomainResult<u64> {
        let now = format_datetime(&Utc::now());

        let result = sqlx::query(
            r#"UPDATE memories SET state = 'deleted', deleted_at = ?, updated_at = ?
               WHERE user_id = ? AND app_id = ? AND state != 'deleted'"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(scope.user_id.to_string())
        .bind(scope.app_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_for_user(&self, user_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// Build a `LIKE` pattern matching `query` literally anywhere in the text.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: String,
    user_id: String,
    app_id: String,
    content: String,
    metadata: Option<String>,
    state: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<MemoryRow> for Memory {
    type Error = DomainError;

    fn try_from(row: MemoryRow) -> Result<Self, Self::Error> {
        let state = MemoryState::from_str(&row.state).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown memory state: {}", row.state))
        })?;

        let metadata = row
            .metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()?
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        Ok(Memory {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            app_id: parse_uuid(&row.app_id)?,
            content: row.content,
            metadata,
            state,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            deleted_at: parse_optional_datetime(row.deleted_at)?,
        })
    }
}
