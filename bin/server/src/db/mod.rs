//! Postgres repositories for sessions, memory and history.
//!
//! Each repository implements the matching storage trait from
//! `recall-conversation` over a shared, already migrated pool.

pub mod history;
pub mod memory;
pub mod session;

pub use history::HistoryRepository;
pub use memory::MemoryRepository;
pub use session::SessionRepository;

use std::fmt::Display;

/// Builds a decode error for a column that holds an unparseable value.
fn invalid_column(column: &str, value: &str, err: impl Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} '{value}': {err}"),
    )))
}
