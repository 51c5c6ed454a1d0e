//! Bounded conversation history per (agent, user) pair.
//!
//! History is append-only and physically pruned: after every append only the
//! [`HISTORY_RETENTION`] most recent entries survive. Ordering is by
//! timestamp, with insertion order breaking ties.

use crate::error::HistoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::{AgentAddress, HistoryEntryId, UserAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of entries kept per (agent, user) pair.
pub const HISTORY_RETENTION: usize = 10;

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user.
    User,
    /// The assistant.
    Assistant,
}

impl Role {
    /// Returns the storage label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown history role: {other}")),
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry identifier.
    pub id: HistoryEntryId,
    /// The agent side of the conversation.
    pub agent: AgentAddress,
    /// The user side of the conversation.
    pub user: UserAddress,
    /// The message text.
    pub content: String,
    /// Who said it.
    pub role: Role,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        agent: AgentAddress,
        user: UserAddress,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            agent,
            user,
            content: content.into(),
            role,
            timestamp: Utc::now(),
        }
    }
}

/// Returns the ids that fall outside the retention window.
///
/// `newest_first` must be ordered descending by timestamp, ties broken by
/// most recently inserted first.
#[must_use]
pub fn beyond_retention(newest_first: &[HistoryEntry]) -> Vec<HistoryEntryId> {
    newest_first
        .iter()
        .skip(HISTORY_RETENTION)
        .map(|entry| entry.id)
        .collect()
}

/// Trait for history storage.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    /// Appends an entry, then prunes the pair down to [`HISTORY_RETENTION`]
    /// entries.
    async fn append(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        role: Role,
        content: &str,
    ) -> Result<HistoryEntry, HistoryError>;

    /// Returns the pair's entries, oldest first.
    async fn get_ordered(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Vec<HistoryEntry>, HistoryError>;
}
