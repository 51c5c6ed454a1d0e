//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `LlmError`: Low-level LLM backend operations
//! - `ToolError`: A single tool invocation
//! - `ToolLoopError`: The multi-round tool-calling loop

use std::fmt;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Provider is unavailable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request failed.
    RequestFailed { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from a single tool invocation.
///
/// Everything except `Fatal` is reported back to the model as a failed tool
/// result so it can react; `Fatal` aborts the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The model asked for a tool that is not bound.
    NotFound { name: String },
    /// The arguments did not match the tool's input schema.
    InvalidInput { name: String, reason: String },
    /// The tool ran but reported a failure.
    Failed { name: String, reason: String },
    /// The tool's backing transport or store failed.
    Fatal { name: String, reason: String },
}

impl ToolError {
    /// Creates an invalid-input error.
    #[must_use]
    pub fn invalid_input(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a non-fatal failure.
    #[must_use]
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error must abort the turn.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
            Self::Failed { name, reason } => {
                write!(f, "tool '{name}' failed: {reason}")
            }
            Self::Fatal { name, reason } => {
                write!(f, "tool '{name}' failed fatally: {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Errors from the tool-calling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLoopError {
    /// The model backend failed.
    Llm(LlmError),
    /// The model kept requesting tools past the configured bound.
    MaxRoundsExceeded { max: u32 },
    /// A tool failed fatally.
    ToolAborted(ToolError),
    /// The model's final answer was blank.
    EmptyAnswer,
}

impl fmt::Display for ToolLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm(err) => write!(f, "{err}"),
            Self::MaxRoundsExceeded { max } => {
                write!(f, "model requested tools for more than {max} rounds")
            }
            Self::ToolAborted(err) => write!(f, "turn aborted: {err}"),
            Self::EmptyAnswer => write!(f, "model returned a blank answer"),
        }
    }
}

impl std::error::Error for ToolLoopError {}

impl From<LlmError> for ToolLoopError {
    fn from(err: LlmError) -> Self {
        Self::Llm(err)
    }
}
