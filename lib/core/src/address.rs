//! Channel addresses for agents and users.
//!
//! An address is whatever the messaging channel uses to route a message
//! (a phone number for SMS). The agent address doubles as the partition key
//! for everything the assistant stores, so the two roles get distinct types
//! and cannot be swapped by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_address {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an address, trimming surrounding whitespace.
            #[must_use]
            pub fn new(address: impl AsRef<str>) -> Self {
                Self(address.as_ref().trim().to_string())
            }

            /// Returns the address as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the address is blank.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(address: &str) -> Self {
                Self::new(address)
            }
        }

        impl From<String> for $name {
            fn from(address: String) -> Self {
                Self::new(address)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_address!(
    /// Address of the assistant identity; the storage partition key.
    AgentAddress
);

define_address!(
    /// Address of an end user conversing with an agent.
    UserAddress
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_trimmed() {
        let address = AgentAddress::new("  +15551234567 ");
        assert_eq!(address.as_str(), "+15551234567");
    }

    #[test]
    fn blank_address_is_empty() {
        assert!(UserAddress::new("   ").is_empty());
    }

    #[test]
    fn address_serde_is_transparent() {
        let address = UserAddress::from("+15559876543");
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, "\"+15559876543\"");
    }
}
