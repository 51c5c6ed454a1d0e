//! OpenAI-compatible chat-completions backend.

use crate::backend::{ChatMessage, ChatRequest, ChatResponse, LlmBackend, MessageRole, TokenUsage, ToolCall};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MAX_ERROR_BODY: usize = 512;

/// Backend speaking the OpenAI chat-completions wire format.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    /// Creates a backend for the given key and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is blank or the HTTP client cannot be
    /// built.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "API key is empty".to_string(),
            });
        }

        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom base URL (for API-compatible services).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: JsonValue,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn function_type() -> String {
    "function".to_string()
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn to_wire_message(message: &ChatMessage) -> WireMessage {
    let tool_calls: Vec<WireToolCall> = message
        .tool_calls
        .iter()
        .map(|call| WireToolCall {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        })
        .collect();

    // Assistant messages carrying tool calls may have null content.
    let content = if !tool_calls.is_empty() && message.content.is_empty() {
        None
    } else {
        Some(message.content.clone())
    };

    WireMessage {
        role: role_name(message.role),
        content,
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn from_wire_tool_call(call: WireToolCall) -> ToolCall {
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or(JsonValue::String(call.function.arguments));
    ToolCall::new(call.id, call.function.name, arguments)
}

fn truncate_body(body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated]", &body[..end])
    } else {
        body
    }
}

fn transport_error(err: &reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::ProviderUnavailable {
            provider: "openai".to_string(),
            reason: err.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    },
                })
                .collect(),
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                reason: format!("HTTP {}: {}", status.as_u16(), truncate_body(body)),
            });
        }

        let data: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParseFailed {
                reason: e.to_string(),
            })?;

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseParseFailed {
                reason: "response contained no choices".to_string(),
            })?;

        let usage = data
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(from_wire_tool_call)
            .collect();

        debug!(
            tool_calls = tool_calls.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "completion received"
        );

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
            usage,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
