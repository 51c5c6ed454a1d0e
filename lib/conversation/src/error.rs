//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SessionError`, `MemoryError`, `HistoryError`: storage operations
//! - `InboundError`: rejected inbound requests
//! - `ChatError`: a failed conversation turn, wrapped in a `Report`

use recall_core::{AgentAddress, MemoryEntryId};
use std::fmt;

/// Errors from session registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => {
                write!(f, "session storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from memory store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No entry with this id exists in the agent's partition.
    NotFound {
        id: MemoryEntryId,
        agent: AgentAddress,
    },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id, agent } => {
                write!(f, "memory entry {id} not found for agent {agent}")
            }
            Self::StorageFailed { reason } => {
                write!(f, "memory storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for MemoryError {}

/// Errors from history log operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => {
                write!(f, "history storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// Reasons an inbound message is rejected before reaching the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundError {
    /// A required field is missing or blank.
    Validation { reason: String },
    /// The request failed the channel authenticity check.
    Authentication,
}

impl fmt::Display for InboundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { reason } => write!(f, "invalid inbound message: {reason}"),
            Self::Authentication => write!(f, "inbound request failed authentication"),
        }
    }
}

impl std::error::Error for InboundError {}

/// A conversation turn that could not produce a reply.
///
/// Callers surface every variant as the same generic apology; the detail is
/// for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The model service or an external provider failed mid-turn.
    Upstream { reason: String },
    /// A store read or write failed.
    Storage { reason: String },
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream { reason } => write!(f, "upstream failure: {reason}"),
            Self::Storage { reason } => write!(f, "storage failure: {reason}"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<SessionError> for ChatError {
    fn from(err: SessionError) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

impl From<HistoryError> for ChatError {
    fn from(err: HistoryError) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_not_found_display() {
        let id = MemoryEntryId::new();
        let err = MemoryError::NotFound {
            id,
            agent: AgentAddress::new("+15550000000"),
        };
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().contains("+15550000000"));
    }

    #[test]
    fn storage_errors_become_chat_storage_errors() {
        let err: ChatError = HistoryError::StorageFailed {
            reason: "disk full".to_string(),
        }
        .into();
        assert!(matches!(err, ChatError::Storage { .. }));
        assert!(err.to_string().contains("disk full"));
    }
}
