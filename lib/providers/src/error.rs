//! Error types for the providers crate.

use std::fmt;

/// Errors from external provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never got a response.
    Transport { provider: String, reason: String },
    /// The provider rejected the credentials.
    AuthenticationFailed { provider: String, reason: String },
    /// The provider answered with an error status.
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    /// The response body did not have the expected shape.
    InvalidResponse { provider: String, reason: String },
    /// The caller's arguments were unusable.
    InvalidRequest { reason: String },
}

impl ProviderError {
    /// Returns true if the provider could not be reached at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { provider, reason } => {
                write!(f, "{provider} unreachable: {reason}")
            }
            Self::AuthenticationFailed { provider, reason } => {
                write!(f, "{provider} authentication failed: {reason}")
            }
            Self::Api {
                provider,
                status,
                message,
            } => write!(f, "{provider} returned HTTP {status}: {message}"),
            Self::InvalidResponse { provider, reason } => {
                write!(f, "unexpected {provider} response: {reason}")
            }
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ProviderError::Api {
            provider: "ynab".to_string(),
            status: 404,
            message: "budget not found".to_string(),
        };
        assert_eq!(err.to_string(), "ynab returned HTTP 404: budget not found");
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_is_detected() {
        let err = ProviderError::Transport {
            provider: "graph".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_transport());
    }
}
