//! Core domain types for the recall assistant.
//!
//! This crate provides the identifiers, channel addresses and error alias
//! shared by every other crate in the workspace.

pub mod address;
pub mod error;
pub mod id;

pub use address::{AgentAddress, UserAddress};
pub use error::Result;
pub use id::{HistoryEntryId, MemoryEntryId, ParseIdError, SessionId};
