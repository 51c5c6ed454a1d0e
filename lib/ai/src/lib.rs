//! Language model primitives for recall.
//!
//! This crate provides:
//!
//! - **Backend**: the `LlmBackend` seam a chat-completion service plugs into
//! - **Tools**: host functions the model may call, and the registry binding them
//! - **Tool loop**: the sequential call-model / run-tools cycle that ends
//!   with a final natural-language answer
//! - **OpenAI**: an OpenAI-compatible chat-completions backend

pub mod backend;
pub mod error;
pub mod openai;
pub mod tool;
pub mod tool_loop;

pub use backend::{ChatMessage, ChatRequest, ChatResponse, LlmBackend, MessageRole, TokenUsage, ToolCall};
pub use error::{LlmError, ToolError, ToolLoopError};
pub use openai::OpenAiBackend;
pub use tool::{Tool, ToolDefinition, ToolRegistry};
pub use tool_loop::{ToolCallRecord, ToolLoop, ToolLoopConfig, ToolLoopOutcome};
