//! The conversation loop for one turn.
//!
//! A turn assembles system instructions, replays the pair's history, binds
//! the memory tools plus any provider tools, runs the model to a final
//! answer, then records the user and assistant turns.
//!
//! The two history appends are independent. If either fails the reply is
//! still returned, so a crash or store failure between them can leave a
//! user turn without its answer.

use crate::command::ChatHandler;
use crate::error::ChatError;
use crate::history::{HistoryLog, Role};
use crate::memory::MemoryStore;
use crate::memory_tools::memory_tools;
use crate::message::InboundMessage;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use recall_ai::{ChatMessage, LlmBackend, Tool, ToolLoop, ToolLoopConfig, ToolRegistry};
use recall_core::{AgentAddress, UserAddress};
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// The assistant's display name.
    pub agent_name: String,
    /// Bound on model rounds that request tools.
    pub max_tool_rounds: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_name: "Recall".to_string(),
            max_tool_rounds: ToolLoopConfig::default().max_rounds,
        }
    }
}

/// A read-only capability wired in next to memory.
struct Capability {
    description: String,
    tools: Vec<Arc<dyn Tool>>,
}

/// Runs conversation turns.
pub struct Orchestrator {
    backend: Arc<dyn LlmBackend>,
    memory: Arc<dyn MemoryStore>,
    history: Arc<dyn HistoryLog>,
    capabilities: Vec<Capability>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over the model backend and stores.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        memory: Arc<dyn MemoryStore>,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Self {
            backend,
            memory,
            history,
            capabilities: Vec::new(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Wires in extra tools, described to the model by `description`.
    #[must_use]
    pub fn with_capability(
        mut self,
        description: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        self.capabilities.push(Capability {
            description: description.into(),
            tools,
        });
        self
    }

    /// Builds the system instructions for a turn.
    #[must_use]
    pub fn system_instructions(
        &self,
        agent: &AgentAddress,
        user: &UserAddress,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> String {
        let name = &self.config.agent_name;
        let local_time = local_time(now, timezone);
        let mut lines = vec![
            format!("- You are an AI agent named {name}."),
            "- You help users remember (1) things to do and (2) general knowledge.".to_string(),
            "- You are a single AI instance serving multiple users.".to_string(),
            format!("- Your address is '{agent}'."),
            format!("- You are currently chatting with a user whose address is '{user}'."),
            "- You have a memory of todos and knowledge that you can save, list and delete \
             with your memory tools."
                .to_string(),
            "- Use your judgement to decide whether the user is talking about todos or \
             knowledge. Todos are action-oriented items the user wants to remember to do later."
                .to_string(),
            "- Todos have no due dates and you cannot remind the user proactively.".to_string(),
        ];
        for capability in &self.capabilities {
            lines.push(format!("- {}", capability.description));
        }
        lines.extend([
            format!("- The user's current local date and time is {local_time}."),
            "- Be concise in your responses because they are sent as text messages.".to_string(),
            "- When listing todos or knowledge, present a numbered list, oldest first, and \
             always exclude entries whose 'deleted' field is set."
                .to_string(),
            "- You have a separate chat history for each user, but your memory is shared \
             across all users."
                .to_string(),
            "- Don't ask \"anything else?\" at the end of your responses.".to_string(),
        ]);
        lines.join("\n")
    }

    fn bind_tools(&self, agent: &AgentAddress, user: &UserAddress) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.extend(memory_tools(&self.memory, agent, user));
        for capability in &self.capabilities {
            registry.extend(capability.tools.iter().cloned());
        }
        registry
    }

    async fn record(&self, agent: &AgentAddress, user: &UserAddress, role: Role, content: &str) {
        if let Err(err) = self.history.append(agent, user, role, content).await {
            warn!(%agent, %user, %role, error = %err, "failed to record history entry");
        }
    }
}

/// Renders `now` in the given IANA zone, falling back to UTC.
#[must_use]
pub fn local_time(now: DateTime<Utc>, timezone: &str) -> String {
    let (tz, label) = match timezone.parse::<Tz>() {
        Ok(tz) => (tz, timezone),
        Err(_) => {
            warn!(timezone, "unknown session timezone, using UTC");
            (Tz::UTC, "UTC")
        }
    };
    let local = now.with_timezone(&tz);
    format!("{} ({label})", local.format("%A, %B %-d, %Y %-I:%M %p"))
}

/// Appends a note about attached media to the message text.
fn user_text(message: &InboundMessage) -> String {
    if !message.has_media() {
        return message.body.clone();
    }
    let note = format!(
        "[The user attached media that you cannot view: {}]",
        message.media_urls.join(", ")
    );
    if message.body.trim().is_empty() {
        note
    } else {
        format!("{}\n\n{note}", message.body)
    }
}

#[async_trait]
impl ChatHandler for Orchestrator {
    #[instrument(skip(self, message, session), fields(agent = %message.to, user = %message.from))]
    async fn chat(
        &self,
        message: &InboundMessage,
        session: &Session,
    ) -> Result<String, Report<ChatError>> {
        let agent = &message.to;
        let user = &message.from;

        let mut messages = vec![ChatMessage::system(self.system_instructions(
            agent,
            user,
            &session.timezone,
            Utc::now(),
        ))];

        let prior = self
            .history
            .get_ordered(agent, user)
            .await
            .map_err(ChatError::from)?;
        debug!(turns = prior.len(), "replaying history");
        messages.extend(prior.into_iter().map(|entry| match entry.role {
            Role::User => ChatMessage::user(entry.content),
            Role::Assistant => ChatMessage::assistant(entry.content),
        }));

        let text = user_text(message);
        messages.push(ChatMessage::user(text.clone()));

        let tools = self.bind_tools(agent, user);
        let outcome = ToolLoop::new(self.backend.as_ref(), &tools)
            .with_config(ToolLoopConfig::default().with_max_rounds(self.config.max_tool_rounds))
            .run(messages)
            .await
            .map_err(|e| ChatError::Upstream {
                reason: e.to_string(),
            })?;

        info!(
            rounds = outcome.rounds,
            tools = %outcome.tool_names(),
            failed_tools = outcome.failed_calls(),
            tool_ms = outcome.tool_latency_ms(),
            tokens = outcome.usage.total(),
            "turn completed"
        );

        self.record(agent, user, Role::User, &text).await;
        self.record(agent, user, Role::Assistant, &outcome.answer).await;

        Ok(outcome.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::history::HistoryEntry;
    use crate::memory::MemoryCategory;
    use crate::memory_backend::{InMemoryHistoryLog, InMemoryMemoryStore};
    use chrono::TimeZone;
    use recall_ai::{ChatRequest, ChatResponse, LlmError, MessageRole, ToolCall};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<ChatResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::answer("ok")))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    struct FailingHistory {
        inner: InMemoryHistoryLog,
    }

    #[async_trait]
    impl HistoryLog for FailingHistory {
        async fn append(
            &self,
            _agent: &AgentAddress,
            _user: &UserAddress,
            _role: Role,
            _content: &str,
        ) -> Result<HistoryEntry, HistoryError> {
            Err(HistoryError::StorageFailed {
                reason: "write timeout".to_string(),
            })
        }

        async fn get_ordered(
            &self,
            agent: &AgentAddress,
            user: &UserAddress,
        ) -> Result<Vec<HistoryEntry>, HistoryError> {
            self.inner.get_ordered(agent, user).await
        }
    }

    fn agent() -> AgentAddress {
        AgentAddress::new("+15550000000")
    }

    fn user() -> UserAddress {
        UserAddress::new("+15551111111")
    }

    fn session() -> Session {
        Session::new(agent(), user(), "America/Los_Angeles")
    }

    fn inbound(body: &str) -> InboundMessage {
        InboundMessage::from_parts(Some(body), Some(user().as_str()), Some(agent().as_str()))
            .unwrap()
    }

    #[test]
    fn local_time_uses_session_zone() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 30, 0).unwrap();
        assert_eq!(
            local_time(now, "America/Los_Angeles"),
            "Wednesday, January 15, 2025 12:30 PM (America/Los_Angeles)"
        );
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 30, 0).unwrap();
        assert_eq!(
            local_time(now, "Mars/Olympus_Mons"),
            "Wednesday, January 15, 2025 8:30 PM (UTC)"
        );
    }

    #[test]
    fn instructions_name_both_parties_and_capabilities() {
        let orchestrator = Orchestrator::new(
            ScriptedBackend::new(vec![]),
            Arc::new(InMemoryMemoryStore::new()),
            Arc::new(InMemoryHistoryLog::new()),
        )
        .with_capability("You have read-only access to the user's finances.", vec![]);

        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 30, 0).unwrap();
        let text = orchestrator.system_instructions(&agent(), &user(), "UTC", now);

        assert!(text.contains("named Recall"));
        assert!(text.contains("'+15550000000'"));
        assert!(text.contains("'+15551111111'"));
        assert!(text.contains("read-only access to the user's finances"));
        assert!(text.contains("oldest first"));
        assert!(text.contains("exclude entries whose 'deleted' field is set"));
        assert!(text.contains("8:30 PM (UTC)"));
        assert!(text.contains("concise"));
    }

    #[tokio::test]
    async fn turn_replays_history_and_records_both_sides() {
        let history = Arc::new(InMemoryHistoryLog::new());
        history
            .append(&agent(), &user(), Role::User, "earlier question")
            .await
            .unwrap();
        history
            .append(&agent(), &user(), Role::Assistant, "earlier answer")
            .await
            .unwrap();

        let backend = ScriptedBackend::new(vec![Ok(ChatResponse::answer("Sure thing."))]);
        let orchestrator = Orchestrator::new(
            backend.clone(),
            Arc::new(InMemoryMemoryStore::new()),
            history.clone(),
        );

        let reply = orchestrator.chat(&inbound("what now?"), &session()).await.unwrap();
        assert_eq!(reply, "Sure thing.");

        let requests = backend.requests.lock().unwrap();
        let sent = &requests[0].messages;
        assert_eq!(sent[0].role, MessageRole::System);
        assert_eq!(sent[1].content, "earlier question");
        assert_eq!(sent[2].role, MessageRole::Assistant);
        assert_eq!(sent[3].content, "what now?");
        assert_eq!(requests[0].tools.len(), 6);

        let recorded = history.get_ordered(&agent(), &user()).await.unwrap();
        assert_eq!(recorded.len(), 4);
        assert_eq!(recorded[2].role, Role::User);
        assert_eq!(recorded[2].content, "what now?");
        assert_eq!(recorded[3].role, Role::Assistant);
        assert_eq!(recorded[3].content, "Sure thing.");
    }

    #[tokio::test]
    async fn model_tool_calls_reach_the_memory_store() {
        let memory = Arc::new(InMemoryMemoryStore::new());
        let backend = ScriptedBackend::new(vec![
            Ok(ChatResponse::tool_calls(vec![ToolCall::new(
                "call_1",
                "save_todo",
                json!({"content": "renew passport"}),
            )])),
            Ok(ChatResponse::answer("Saved.")),
        ]);
        let orchestrator = Orchestrator::new(
            backend,
            memory.clone(),
            Arc::new(InMemoryHistoryLog::new()),
        );

        let reply = orchestrator
            .chat(&inbound("remind me to renew my passport"), &session())
            .await
            .unwrap();
        assert_eq!(reply, "Saved.");

        let stored = memory.list(&agent()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, MemoryCategory::Todo);
        assert_eq!(stored[0].content, "renew passport");
        assert_eq!(stored[0].user, user());
    }

    #[tokio::test]
    async fn model_failure_is_upstream_and_records_nothing() {
        let history = Arc::new(InMemoryHistoryLog::new());
        let backend = ScriptedBackend::new(vec![Err(LlmError::Timeout)]);
        let orchestrator = Orchestrator::new(
            backend,
            Arc::new(InMemoryMemoryStore::new()),
            history.clone(),
        );

        let result = orchestrator.chat(&inbound("hello?"), &session()).await;
        assert!(result.is_err());
        assert!(history.get_ordered(&agent(), &user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_model_answer_is_upstream_and_records_nothing() {
        let history = Arc::new(InMemoryHistoryLog::new());
        let backend = ScriptedBackend::new(vec![Ok(ChatResponse::answer(" "))]);
        let orchestrator = Orchestrator::new(
            backend,
            Arc::new(InMemoryMemoryStore::new()),
            history.clone(),
        );

        let err = orchestrator
            .chat(&inbound("hello?"), &session())
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChatError::Upstream { .. }));
        assert!(history.get_ordered(&agent(), &user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_write_failure_still_returns_reply() {
        let backend = ScriptedBackend::new(vec![Ok(ChatResponse::answer("Here you go."))]);
        let orchestrator = Orchestrator::new(
            backend,
            Arc::new(InMemoryMemoryStore::new()),
            Arc::new(FailingHistory {
                inner: InMemoryHistoryLog::new(),
            }),
        );

        let reply = orchestrator.chat(&inbound("hi"), &session()).await.unwrap();
        assert_eq!(reply, "Here you go.");
    }

    #[tokio::test]
    async fn media_is_described_to_the_model() {
        let backend = ScriptedBackend::new(vec![Ok(ChatResponse::answer("Nice photo."))]);
        let orchestrator = Orchestrator::new(
            backend.clone(),
            Arc::new(InMemoryMemoryStore::new()),
            Arc::new(InMemoryHistoryLog::new()),
        );
        let message =
            inbound("").with_media(vec!["https://media.example/cat.jpg".to_string()]);

        orchestrator.chat(&message, &session()).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        let last = requests[0].messages.last().unwrap();
        assert!(last.content.contains("https://media.example/cat.jpg"));
    }

    #[tokio::test]
    async fn concurrent_turns_for_one_user_both_complete() {
        let history = Arc::new(InMemoryHistoryLog::new());
        let orchestrator = Arc::new(Orchestrator::new(
            ScriptedBackend::new(vec![]),
            Arc::new(InMemoryMemoryStore::new()),
            history.clone(),
        ));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.chat(&inbound("one"), &session()).await })
        };
        let second = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.chat(&inbound("two"), &session()).await })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        let recorded = history.get_ordered(&agent(), &user()).await.unwrap();
        assert_eq!(recorded.len(), 4);
    }
}
