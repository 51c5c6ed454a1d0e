//! Domain error types for server operations.

use std::fmt;

/// Errors that stop the process before it serves requests.
#[derive(Debug)]
pub enum StartupError {
    /// Required configuration is missing or invalid.
    Configuration { details: String },
    /// The database could not be reached or migrated.
    Database { details: String },
    /// The model backend could not be built.
    Llm { details: String },
    /// The listener could not be bound or failed while serving.
    Server { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database unavailable: {details}"),
            Self::Llm { details } => write!(f, "model backend unavailable: {details}"),
            Self::Server { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Errors sending an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The gateway could not be reached.
    Transport { details: String },
    /// The gateway rejected the message.
    Rejected { status: u16, details: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { details } => write!(f, "channel unreachable: {details}"),
            Self::Rejected { status, details } => {
                write!(f, "channel rejected message (HTTP {status}): {details}")
            }
        }
    }
}

impl std::error::Error for ChannelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_rejection_display_includes_status() {
        let err = ChannelError::Rejected {
            status: 400,
            details: "invalid 'To' number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "channel rejected message (HTTP 400): invalid 'To' number"
        );
    }
}
