//! Memory store backed by the `memory_entries` table.

use super::invalid_column;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_conversation::{MemoryCategory, MemoryEntry, MemoryError, MemoryStore};
use recall_core::{AgentAddress, MemoryEntryId, UserAddress};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for memory entry queries.
#[derive(FromRow)]
struct MemoryRow {
    id: String,
    agent_address: String,
    category: String,
    content: String,
    user_address: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl MemoryRow {
    fn try_into_entry(self) -> Result<MemoryEntry, sqlx::Error> {
        let id = MemoryEntryId::from_str(&self.id)
            .map_err(|e| invalid_column("memory entry id", &self.id, e))?;
        let category = MemoryCategory::from_str(&self.category)
            .map_err(|e| invalid_column("category", &self.category, e))?;
        Ok(MemoryEntry {
            id,
            category,
            content: self.content,
            user: UserAddress::new(self.user_address),
            agent: AgentAddress::new(self.agent_address),
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

fn storage_failed(err: sqlx::Error) -> MemoryError {
    MemoryError::StorageFailed {
        reason: err.to_string(),
    }
}

/// Postgres-backed [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryRepository {
    pool: PgPool,
}

impl MemoryRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryStore for MemoryRepository {
    #[instrument(skip(self, content), fields(agent = %agent, category = %category))]
    async fn save(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryEntry, MemoryError> {
        let entry = MemoryEntry::new(agent.clone(), user.clone(), category, content);
        sqlx::query(
            r#"
            INSERT INTO memory_entries
                (agent_address, id, category, content, user_address, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, NULL)
            "#,
        )
        .bind(entry.agent.as_str())
        .bind(entry.id.to_string())
        .bind(entry.category.as_str())
        .bind(&entry.content)
        .bind(entry.user.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(entry)
    }

    async fn list(&self, agent: &AgentAddress) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows: Vec<MemoryRow> = sqlx::query_as(
            r#"
            SELECT id, agent_address, category, content, user_address, created_at, deleted_at
            FROM memory_entries
            WHERE agent_address = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(agent.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;

        rows.into_iter()
            .map(MemoryRow::try_into_entry)
            .collect::<Result<_, _>>()
            .map_err(storage_failed)
    }

    #[instrument(skip(self), fields(agent = %agent, id = %id))]
    async fn delete(
        &self,
        agent: &AgentAddress,
        id: MemoryEntryId,
    ) -> Result<MemoryEntry, MemoryError> {
        let row: Option<MemoryRow> = sqlx::query_as(
            r#"
            UPDATE memory_entries
            SET deleted_at = $3
            WHERE agent_address = $1 AND id = $2
            RETURNING id, agent_address, category, content, user_address, created_at, deleted_at
            "#,
        )
        .bind(agent.as_str())
        .bind(id.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_failed)?;

        match row {
            Some(row) => row.try_into_entry().map_err(storage_failed),
            None => Err(MemoryError::NotFound {
                id,
                agent: agent.clone(),
            }),
        }
    }
}
