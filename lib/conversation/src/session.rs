//! Conversation sessions.
//!
//! A session is the record proving a user opted into conversing with an
//! agent. It is keyed by the (agent, user) pair; its id is only used for
//! removal.

use crate::error::SessionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::{AgentAddress, SessionId, UserAddress};
use serde::{Deserialize, Serialize};

/// An active conversation between an agent and a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// The agent being conversed with.
    pub agent: AgentAddress,
    /// The user who started the session.
    pub user: UserAddress,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// IANA timezone label used to render local time.
    pub timezone: String,
}

impl Session {
    /// Creates a new session.
    #[must_use]
    pub fn new(agent: AgentAddress, user: UserAddress, timezone: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            agent,
            user,
            created_at: Utc::now(),
            timezone: timezone.into(),
        }
    }
}

/// Trait for session storage.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Inserts a new session without checking for an existing one.
    async fn create(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        timezone: &str,
    ) -> Result<Session, SessionError>;

    /// Gets the session for the pair, if any.
    ///
    /// If several exist, the oldest is returned.
    async fn get(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Option<Session>, SessionError>;

    /// Lists every session for an agent.
    async fn get_all(&self, agent: &AgentAddress) -> Result<Vec<Session>, SessionError>;

    /// Removes the session `get` would return. A missing session is not an
    /// error.
    async fn delete(&self, agent: &AgentAddress, user: &UserAddress) -> Result<(), SessionError>;
}
