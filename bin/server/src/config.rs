//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables. Nested keys use
//! a double underscore, so `LLM__API_KEY` populates `llm.api_key`.

use recall_conversation::CommandConfig;
use recall_providers::{GraphConfig, YnabConfig};
use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Maximum pooled database connections.
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Language model settings.
    pub llm: LlmConfig,

    /// Twilio account used to send replies and to check webhook signatures.
    pub twilio: TwilioConfig,

    /// Shared key `/messages` callers send in the `x-api-key` header.
    pub inbound: InboundConfig,

    /// Assistant persona and command phrases.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Listener settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Microsoft Graph access; the workspace tools are bound only when set.
    #[serde(default)]
    pub graph: Option<GraphSection>,

    /// YNAB access; the budget tools are bound only when set.
    #[serde(default)]
    pub ynab: Option<YnabSection>,
}

/// Language model settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// API key for the OpenAI-compatible endpoint.
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Bound on model calls that request tools within one turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

/// Twilio REST credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,

    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

/// Inbound request authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    pub api_key: String,
}

/// Assistant persona and command phrases.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_start_phrase")]
    pub start_phrase: String,

    #[serde(default = "default_end_phrase")]
    pub end_phrase: String,

    /// IANA timezone given to new sessions.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Microsoft Graph app registration.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_id: String,
}

/// YNAB access.
#[derive(Debug, Clone, Deserialize)]
pub struct YnabSection {
    pub access_token: String,

    #[serde(default = "default_budget_id")]
    pub budget_id: String,
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_llm_base_url() -> String {
    recall_ai::openai::DEFAULT_BASE_URL.to_string()
}

fn default_max_tool_rounds() -> u32 {
    recall_ai::tool_loop::DEFAULT_MAX_ROUNDS
}

fn default_twilio_base_url() -> String {
    crate::channel::DEFAULT_TWILIO_URL.to_string()
}

fn default_agent_name() -> String {
    CommandConfig::default().agent_name
}

fn default_start_phrase() -> String {
    CommandConfig::default().start_phrase
}

fn default_end_phrase() -> String {
    CommandConfig::default().end_phrase
}

fn default_timezone() -> String {
    CommandConfig::default().default_timezone
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_budget_id() -> String {
    recall_providers::ynab::LAST_USED_BUDGET.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            start_phrase: default_start_phrase(),
            end_phrase: default_end_phrase(),
            default_timezone: default_timezone(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl From<&AgentConfig> for CommandConfig {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            agent_name: agent.name.clone(),
            start_phrase: agent.start_phrase.clone(),
            end_phrase: agent.end_phrase.clone(),
            default_timezone: agent.default_timezone.clone(),
        }
    }
}

impl From<GraphSection> for GraphConfig {
    fn from(section: GraphSection) -> Self {
        Self {
            tenant_id: section.tenant_id,
            client_id: section.client_id,
            client_secret: section.client_secret,
            user_id: section.user_id,
        }
    }
}

impl From<YnabSection> for YnabConfig {
    fn from(section: YnabSection) -> Self {
        Self {
            access_token: section.access_token,
            budget_id: section.budget_id,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    fn load(source: Option<config::Map<String, String>>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(source),
            )
            .build()?
            .try_deserialize()
    }
}
