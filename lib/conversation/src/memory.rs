//! Category-tagged memory entries with soft delete.
//!
//! Memory is partitioned by agent and shared by every user of that agent;
//! the authoring user is recorded on each entry. Deleting an entry stamps
//! `deleted_at` and leaves the entry in place. Listing returns tombstones
//! too, so presenting only live entries is up to the caller.

use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::{AgentAddress, MemoryEntryId, UserAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of thing a memory entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// An action item the user wants to remember to do.
    Todo,
    /// A general fact the user wants remembered.
    Knowledge,
}

impl MemoryCategory {
    /// All categories.
    pub const ALL: [Self; 2] = [Self::Todo, Self::Knowledge];

    /// Returns the storage label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "knowledge" => Ok(Self::Knowledge),
            other => Err(format!("unknown memory category: {other}")),
        }
    }
}

/// A stored memory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique within the agent partition.
    pub id: MemoryEntryId,
    /// What kind of entry this is.
    pub category: MemoryCategory,
    /// Free-text content.
    pub content: String,
    /// The user who saved the entry.
    pub user: UserAddress,
    /// The owning agent; the partition key.
    pub agent: AgentAddress,
    /// When the entry was saved.
    pub created_at: DateTime<Utc>,
    /// Tombstone; set when the entry is deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Creates a live entry stamped with the current time.
    #[must_use]
    pub fn new(
        agent: AgentAddress,
        user: UserAddress,
        category: MemoryCategory,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MemoryEntryId::new(),
            category,
            content: content.into(),
            user,
            agent,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Returns true if the entry has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Trait for memory storage.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Saves a new live entry. There is no duplicate detection.
    async fn save(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryEntry, MemoryError>;

    /// Lists every entry in the agent's partition, tombstones included,
    /// oldest first.
    async fn list(&self, agent: &AgentAddress) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Stamps the entry's tombstone with the current time and returns it.
    ///
    /// Deleting an already deleted entry succeeds and overwrites the
    /// tombstone time.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::NotFound` if the id does not exist in the
    /// agent's partition.
    async fn delete(
        &self,
        agent: &AgentAddress,
        id: MemoryEntryId,
    ) -> Result<MemoryEntry, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_roundtrip() {
        for category in MemoryCategory::ALL {
            assert_eq!(category.as_str().parse::<MemoryCategory>(), Ok(category));
        }
        assert!("note".parse::<MemoryCategory>().is_err());
    }

    #[test]
    fn new_entry_is_live() {
        let entry = MemoryEntry::new(
            AgentAddress::new("+15550000000"),
            UserAddress::new("+15551111111"),
            MemoryCategory::Todo,
            "buy milk",
        );
        assert!(!entry.is_deleted());
        assert_eq!(entry.category, MemoryCategory::Todo);
    }

    #[test]
    fn entry_serializes_category_as_label() {
        let entry = MemoryEntry::new(
            AgentAddress::new("+15550000000"),
            UserAddress::new("+15551111111"),
            MemoryCategory::Knowledge,
            "the wifi password is hunter2",
        );
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["category"], "knowledge");
        assert!(json["deleted_at"].is_null());
    }
}
