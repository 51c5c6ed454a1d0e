//! Session registry backed by the `sessions` table.

use super::invalid_column;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_conversation::{Session, SessionError, SessionRegistry};
use recall_core::{AgentAddress, SessionId, UserAddress};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    agent_address: String,
    user_address: String,
    timezone: String,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, sqlx::Error> {
        let id = SessionId::from_str(&self.id)
            .map_err(|e| invalid_column("session id", &self.id, e))?;
        Ok(Session {
            id,
            agent: AgentAddress::new(self.agent_address),
            user: UserAddress::new(self.user_address),
            created_at: self.created_at,
            timezone: self.timezone,
        })
    }
}

fn storage_failed(err: sqlx::Error) -> SessionError {
    SessionError::StorageFailed {
        reason: err.to_string(),
    }
}

/// Postgres-backed [`SessionRegistry`].
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRegistry for SessionRepository {
    #[instrument(skip(self), fields(agent = %agent, user = %user))]
    async fn create(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        timezone: &str,
    ) -> Result<Session, SessionError> {
        let session = Session::new(agent.clone(), user.clone(), timezone);
        sqlx::query(
            r#"
            INSERT INTO sessions (id, agent_address, user_address, timezone, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.agent.as_str())
        .bind(session.user.as_str())
        .bind(&session.timezone)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(session)
    }

    async fn get(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Option<Session>, SessionError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, agent_address, user_address, timezone, created_at
            FROM sessions
            WHERE agent_address = $1 AND user_address = $2
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(agent.as_str())
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_failed)?;

        row.map(SessionRow::try_into_session)
            .transpose()
            .map_err(storage_failed)
    }

    async fn get_all(&self, agent: &AgentAddress) -> Result<Vec<Session>, SessionError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, agent_address, user_address, timezone, created_at
            FROM sessions
            WHERE agent_address = $1
            ORDER BY created_at
            "#,
        )
        .bind(agent.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;

        rows.into_iter()
            .map(SessionRow::try_into_session)
            .collect::<Result<_, _>>()
            .map_err(storage_failed)
    }

    #[instrument(skip(self), fields(agent = %agent, user = %user))]
    async fn delete(&self, agent: &AgentAddress, user: &UserAddress) -> Result<(), SessionError> {
        // Removes the session `get` returns; any duplicate is left for the next end.
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = (
                SELECT id FROM sessions
                WHERE agent_address = $1 AND user_address = $2
                ORDER BY created_at, id
                LIMIT 1
            )
            "#,
        )
        .bind(agent.as_str())
        .bind(user.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }
}
