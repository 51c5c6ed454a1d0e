//! recall server.
//!
//! This crate provides the process around the conversation core:
//!
//! - **Configuration** from environment variables
//! - **Postgres repositories** for sessions, memory and history
//! - **Outbound channel** sending replies through Twilio
//! - **Inbound routes** for the SMS webhook and a direct messages endpoint
//! - **Webhook signatures** checked on every gateway request

pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod signature;

use crate::config::ServerConfig;
use crate::db::{HistoryRepository, MemoryRepository, SessionRepository};
use crate::error::StartupError;
use recall_ai::OpenAiBackend;
use recall_conversation::{CommandConfig, CommandRouter, Orchestrator, OrchestratorConfig};
use recall_providers::{
    BUDGET_CAPABILITY, GraphClient, WORKSPACE_CAPABILITY, YnabClient, budget_tools,
    workspace_tools,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Wires the model backend, stores and providers into a command router.
///
/// # Errors
///
/// Returns an error if the model backend configuration is invalid.
pub fn build_router(
    config: &ServerConfig,
    pool: PgPool,
    http: reqwest::Client,
) -> recall_core::Result<CommandRouter, StartupError> {
    let backend = OpenAiBackend::new(&config.llm.api_key, &config.llm.model)
        .map_err(|e| StartupError::Llm {
            details: e.to_string(),
        })?
        .with_base_url(&config.llm.base_url);

    let mut orchestrator = Orchestrator::new(
        Arc::new(backend),
        Arc::new(MemoryRepository::new(pool.clone())),
        Arc::new(HistoryRepository::new(pool.clone())),
    )
    .with_config(OrchestratorConfig {
        agent_name: config.agent.name.clone(),
        max_tool_rounds: config.llm.max_tool_rounds,
    });

    if let Some(graph) = config.graph.clone() {
        info!("workspace tools enabled");
        let client = GraphClient::new(http.clone(), graph.into());
        orchestrator =
            orchestrator.with_capability(WORKSPACE_CAPABILITY, workspace_tools(Arc::new(client)));
    }
    if let Some(ynab) = config.ynab.clone() {
        info!("budget tools enabled");
        let client = YnabClient::new(http, ynab.into());
        orchestrator =
            orchestrator.with_capability(BUDGET_CAPABILITY, budget_tools(Arc::new(client)));
    }

    Ok(CommandRouter::new(
        Arc::new(SessionRepository::new(pool)),
        Arc::new(orchestrator),
        CommandConfig::from(&config.agent),
    ))
}
