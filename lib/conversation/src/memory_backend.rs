//! In-process backends for the storage traits.
//!
//! Used by tests and local runs. Each store keeps its records in insertion
//! order behind an async mutex.

use crate::error::{HistoryError, MemoryError, SessionError};
use crate::history::{HistoryEntry, HistoryLog, Role, beyond_retention};
use crate::memory::{MemoryCategory, MemoryEntry, MemoryStore};
use crate::session::{Session, SessionRegistry};
use async_trait::async_trait;
use chrono::Utc;
use recall_core::{AgentAddress, MemoryEntryId, UserAddress};
use tokio::sync::Mutex;

/// Session registry held in memory.
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        timezone: &str,
    ) -> Result<Session, SessionError> {
        let session = Session::new(agent.clone(), user.clone(), timezone);
        self.sessions.lock().await.push(session.clone());
        Ok(session)
    }

    async fn get(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .iter()
            .find(|s| &s.agent == agent && &s.user == user)
            .cloned())
    }

    async fn get_all(&self, agent: &AgentAddress) -> Result<Vec<Session>, SessionError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.iter().filter(|s| &s.agent == agent).cloned().collect())
    }

    async fn delete(&self, agent: &AgentAddress, user: &UserAddress) -> Result<(), SessionError> {
        let Some(session) = self.get(agent, user).await? else {
            return Ok(());
        };
        self.sessions.lock().await.retain(|s| s.id != session.id);
        Ok(())
    }
}

/// Memory store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    entries: Mutex<Vec<MemoryEntry>>,
}

impl InMemoryMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn save(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryEntry, MemoryError> {
        let entry = MemoryEntry::new(agent.clone(), user.clone(), category, content);
        self.entries.lock().await.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, agent: &AgentAddress) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.lock().await;
        let mut listed: Vec<_> = entries.iter().filter(|e| &e.agent == agent).cloned().collect();
        listed.sort_by_key(|e| e.created_at);
        Ok(listed)
    }

    async fn delete(
        &self,
        agent: &AgentAddress,
        id: MemoryEntryId,
    ) -> Result<MemoryEntry, MemoryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id && &e.agent == agent)
            .ok_or_else(|| MemoryError::NotFound {
                id,
                agent: agent.clone(),
            })?;
        entry.deleted_at = Some(Utc::now());
        Ok(entry.clone())
    }
}

/// History log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl InMemoryHistoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn newest_first(&self, agent: &AgentAddress, user: &UserAddress) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        let mut pair: Vec<_> = entries
            .iter()
            .rev()
            .filter(|e| &e.agent == agent && &e.user == user)
            .cloned()
            .collect();
        pair.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        pair
    }

    async fn prune(&self, agent: &AgentAddress, user: &UserAddress) {
        let stale = beyond_retention(&self.newest_first(agent, user).await);
        if stale.is_empty() {
            return;
        }
        self.entries.lock().await.retain(|e| !stale.contains(&e.id));
    }
}

#[async_trait]
impl HistoryLog for InMemoryHistoryLog {
    async fn append(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        role: Role,
        content: &str,
    ) -> Result<HistoryEntry, HistoryError> {
        let entry = HistoryEntry::new(agent.clone(), user.clone(), role, content);
        self.entries.lock().await.push(entry.clone());
        self.prune(agent, user).await;
        Ok(entry)
    }

    async fn get_ordered(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut ordered = self.newest_first(agent, user).await;
        ordered.reverse();
        Ok(ordered)
    }
}
