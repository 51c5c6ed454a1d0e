//! Conversation core for recall.
//!
//! This crate provides:
//!
//! - **Sessions**: the registry gating who may converse with an agent
//! - **Memory**: the category-tagged, agent-partitioned store with soft delete
//! - **History**: the retention-bounded per-pair turn log
//! - **Commands**: reserved start/end phrases and session gating
//! - **Orchestrator**: one conversation turn over the model and tools
//! - **In-memory backends** for every storage trait

pub mod command;
pub mod error;
pub mod history;
pub mod memory;
pub mod memory_backend;
pub mod memory_tools;
pub mod message;
pub mod orchestrator;
pub mod session;

pub use command::{ChatHandler, CommandConfig, CommandRouter};
pub use error::{ChatError, HistoryError, InboundError, MemoryError, SessionError};
pub use history::{HISTORY_RETENTION, HistoryEntry, HistoryLog, Role};
pub use memory::{MemoryCategory, MemoryEntry, MemoryStore};
pub use memory_backend::{InMemoryHistoryLog, InMemoryMemoryStore, InMemorySessionRegistry};
pub use memory_tools::memory_tools;
pub use message::InboundMessage;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use session::{Session, SessionRegistry};
