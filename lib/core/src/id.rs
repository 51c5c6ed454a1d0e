//! Strongly-typed ID types for domain entities.
//!
//! All IDs wrap a ULID. The display form carries a short type prefix
//! (`mem_01H...`), and parsing accepts both the prefixed and the bare form
//! so ids echoed back by the language model round-trip cleanly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = if let Some(stripped) = s.strip_prefix(prefix_with_underscore) {
                    stripped
                } else {
                    s
                };

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a conversation session.
    SessionId,
    "sess"
);

define_id!(
    /// Unique identifier for a stored memory entry (todo, knowledge, ...).
    MemoryEntryId,
    "mem"
);

define_id!(
    /// Unique identifier for one turn in the conversation history.
    HistoryEntryId,
    "hist"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_display_format() {
        let id = SessionId::new();
        assert!(id.to_string().starts_with("sess_"));
    }

    #[test]
    fn memory_entry_id_display_format() {
        let id = MemoryEntryId::new();
        assert!(id.to_string().starts_with("mem_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = MemoryEntryId::new();
        let parsed: MemoryEntryId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: HistoryEntryId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let id = MemoryEntryId::new();
        let parsed: MemoryEntryId = format!("  {id} ").parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "not_a_ulid".parse::<MemoryEntryId>().unwrap_err();
        assert_eq!(err.id_type, "MemoryEntryId");
    }

    #[test]
    fn id_hash() {
        use std::collections::HashSet;

        let id1 = SessionId::new();
        let id2 = SessionId::new();

        let mut set = HashSet::new();
        set.insert(id1);
        set.insert(id2);
        set.insert(id1);

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = HistoryEntryId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let parsed: HistoryEntryId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
