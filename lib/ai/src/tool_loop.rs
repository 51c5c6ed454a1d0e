//! The tool-calling loop.
//!
//! One conversation turn is driven by repeatedly:
//! 1. Sending the conversation plus tool schema to the model
//! 2. Executing every tool the model requested, in order, one at a time
//! 3. Feeding each result back as a tool message
//!
//! until the model answers without requesting tools, or the round bound is
//! hit. Non-fatal tool failures are fed back to the model as `{"error": ...}`
//! results; fatal ones abort the turn.

use crate::backend::{ChatMessage, ChatRequest, LlmBackend, TokenUsage};
use crate::error::{ToolError, ToolLoopError};
use crate::tool::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Default bound on model rounds that request tools.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Configuration for the tool loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLoopConfig {
    /// Maximum number of model responses that may request tools.
    pub max_rounds: u32,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl ToolLoopConfig {
    /// Sets the maximum rounds.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

/// One tool call made during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub tool: String,
    pub latency_ms: u64,
    /// The error fed back to the model, if the call failed.
    pub error: Option<String>,
}

impl ToolCallRecord {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// The result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolLoopOutcome {
    /// The model's final natural-language answer. Never blank.
    pub answer: String,
    /// Every tool call, in execution order.
    pub calls: Vec<ToolCallRecord>,
    /// Number of model calls made.
    pub rounds: u32,
    /// Accumulated token usage.
    pub usage: TokenUsage,
}

impl ToolLoopOutcome {
    /// Number of tool calls that failed without aborting the turn.
    #[must_use]
    pub fn failed_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.failed()).count()
    }

    /// Tool names in call order, comma separated.
    #[must_use]
    pub fn tool_names(&self) -> String {
        self.calls
            .iter()
            .map(|c| c.tool.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Total time spent inside tools.
    #[must_use]
    pub fn tool_latency_ms(&self) -> u64 {
        self.calls.iter().map(|c| c.latency_ms).sum()
    }
}

/// Runs the sequential tool-calling loop against a backend.
pub struct ToolLoop<'a> {
    backend: &'a dyn LlmBackend,
    tools: &'a ToolRegistry,
    config: ToolLoopConfig,
}

impl<'a> ToolLoop<'a> {
    /// Creates a loop over the given backend and bound tools.
    #[must_use]
    pub fn new(backend: &'a dyn LlmBackend, tools: &'a ToolRegistry) -> Self {
        Self {
            backend,
            tools,
            config: ToolLoopConfig::default(),
        }
    }

    /// Sets the loop configuration.
    #[must_use]
    pub fn with_config(mut self, config: ToolLoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the loop to a final answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, a tool fails fatally, the model
    /// is still requesting tools after `max_rounds` rounds, or its final
    /// answer is blank.
    pub async fn run(&self, messages: Vec<ChatMessage>) -> Result<ToolLoopOutcome, ToolLoopError> {
        let mut messages = messages;
        let mut calls = Vec::new();
        let mut usage = TokenUsage::default();
        let mut tool_rounds = 0u32;
        let mut rounds = 0u32;
        let definitions = self.tools.definitions();

        loop {
            let request = ChatRequest::new(messages.clone()).with_tools(definitions.clone());
            let response = self.backend.complete(&request).await?;
            rounds += 1;
            usage.add(response.usage);

            if !response.wants_tools() {
                let answer = response.content.unwrap_or_default();
                if answer.trim().is_empty() {
                    warn!(rounds, "model returned a blank answer");
                    return Err(ToolLoopError::EmptyAnswer);
                }
                return Ok(ToolLoopOutcome {
                    answer,
                    calls,
                    rounds,
                    usage,
                });
            }

            tool_rounds += 1;
            if tool_rounds > self.config.max_rounds {
                warn!(
                    max_rounds = self.config.max_rounds,
                    "model exceeded tool round limit"
                );
                return Err(ToolLoopError::MaxRoundsExceeded {
                    max: self.config.max_rounds,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.content.unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let started = Instant::now();
                let result = self.tools.execute(call).await;
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                let (content, error) = match result {
                    Ok(output) => {
                        debug!(tool = %call.name, latency_ms, "tool call succeeded");
                        (output.to_string(), None)
                    }
                    Err(err) if err.is_fatal() => {
                        warn!(tool = %call.name, error = %err, "tool call aborted turn");
                        return Err(ToolLoopError::ToolAborted(err));
                    }
                    Err(err) => {
                        debug!(tool = %call.name, error = %err, "tool call failed");
                        (tool_error_result(&err), Some(err.to_string()))
                    }
                };
                calls.push(ToolCallRecord {
                    tool: call.name.clone(),
                    latency_ms,
                    error,
                });

                messages.push(ChatMessage::tool_result(&call.id, content));
            }
        }
    }
}

fn tool_error_result(err: &ToolError) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}
