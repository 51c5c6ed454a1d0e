//! History log backed by the `history_entries` table.
//!
//! `seq` orders entries that share a timestamp, so pruning and replay agree
//! with insertion order.

use super::invalid_column;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_conversation::{HISTORY_RETENTION, HistoryEntry, HistoryError, HistoryLog, Role};
use recall_core::{AgentAddress, HistoryEntryId, UserAddress};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Row type for history queries.
#[derive(FromRow)]
struct HistoryRow {
    id: String,
    agent_address: String,
    user_address: String,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn try_into_entry(self) -> Result<HistoryEntry, sqlx::Error> {
        let id = HistoryEntryId::from_str(&self.id)
            .map_err(|e| invalid_column("history entry id", &self.id, e))?;
        let role = Role::from_str(&self.role).map_err(|e| invalid_column("role", &self.role, e))?;
        Ok(HistoryEntry {
            id,
            agent: AgentAddress::new(self.agent_address),
            user: UserAddress::new(self.user_address),
            content: self.content,
            role,
            timestamp: self.created_at,
        })
    }
}

fn storage_failed(err: sqlx::Error) -> HistoryError {
    HistoryError::StorageFailed {
        reason: err.to_string(),
    }
}

/// Postgres-backed [`HistoryLog`].
#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn prune(&self, agent: &AgentAddress, user: &UserAddress) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM history_entries
            WHERE seq IN (
                SELECT seq FROM history_entries
                WHERE agent_address = $1 AND user_address = $2
                ORDER BY created_at DESC, seq DESC
                OFFSET $3
            )
            "#,
        )
        .bind(agent.as_str())
        .bind(user.as_str())
        .bind(HISTORY_RETENTION as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HistoryLog for HistoryRepository {
    #[instrument(skip(self, content), fields(agent = %agent, user = %user, role = %role))]
    async fn append(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        role: Role,
        content: &str,
    ) -> Result<HistoryEntry, HistoryError> {
        let entry = HistoryEntry::new(agent.clone(), user.clone(), role, content);
        sqlx::query(
            r#"
            INSERT INTO history_entries (id, agent_address, user_address, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.agent.as_str())
        .bind(entry.user.as_str())
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;

        let pruned = self.prune(agent, user).await.map_err(storage_failed)?;
        if pruned > 0 {
            debug!(pruned, "history pruned");
        }
        Ok(entry)
    }

    async fn get_ordered(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, agent_address, user_address, role, content, created_at
            FROM history_entries
            WHERE agent_address = $1 AND user_address = $2
            ORDER BY created_at, seq
            "#,
        )
        .bind(agent.as_str())
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;

        rows.into_iter()
            .map(HistoryRow::try_into_entry)
            .collect::<Result<_, _>>()
            .map_err(storage_failed)
    }
}
