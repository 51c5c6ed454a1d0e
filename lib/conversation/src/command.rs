//! Reserved command phrases and session gating.
//!
//! Every inbound message passes through the [`CommandRouter`] first. The
//! start and end phrases open and close a session and get canned replies.
//! Any other message is handed to the [`ChatHandler`] only when a session
//! exists; otherwise the router returns `None` and nothing is sent back.

use crate::error::ChatError;
use crate::message::InboundMessage;
use crate::session::{Session, SessionRegistry};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Reply when "start" arrives for an existing session.
pub const ALREADY_ACTIVE_REPLY: &str = "You already have an active session.";

/// Reply when "end" arrives without a session.
pub const NO_SESSION_REPLY: &str = "You don't have an active session.";

/// Something that can answer an ordinary message within a session.
#[async_trait]
pub trait ChatHandler: Send + Sync {
    /// Produces the reply to a message.
    async fn chat(
        &self,
        message: &InboundMessage,
        session: &Session,
    ) -> Result<String, Report<ChatError>>;
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// The assistant's display name, used in canned replies.
    pub agent_name: String,
    /// Phrase that opens a session.
    pub start_phrase: String,
    /// Phrase that closes a session.
    pub end_phrase: String,
    /// Timezone given to new sessions.
    pub default_timezone: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            agent_name: "Recall".to_string(),
            start_phrase: "hello recall".to_string(),
            end_phrase: "goodbye recall".to_string(),
            default_timezone: "America/Los_Angeles".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    End,
}

/// Dispatches inbound messages.
pub struct CommandRouter {
    sessions: Arc<dyn SessionRegistry>,
    chat: Arc<dyn ChatHandler>,
    config: CommandConfig,
}

impl CommandRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionRegistry>,
        chat: Arc<dyn ChatHandler>,
        config: CommandConfig,
    ) -> Self {
        Self {
            sessions,
            chat,
            config,
        }
    }

    fn command(&self, text: &str) -> Option<Command> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(self.config.start_phrase.trim()) {
            Some(Command::Start)
        } else if text.eq_ignore_ascii_case(self.config.end_phrase.trim()) {
            Some(Command::End)
        } else {
            None
        }
    }

    /// The reply to a successful start.
    #[must_use]
    pub fn welcome_reply(&self) -> String {
        format!(
            "Welcome! I'm {}, your AI memory assistant. I can help you remember todos and \
             general knowledge by text. Try sending me a todo!",
            self.config.agent_name
        )
    }

    /// The reply to a successful end.
    #[must_use]
    pub fn goodbye_reply(&self) -> String {
        format!(
            "Goodbye! Your session has been ended. Your todos and knowledge have been \
             preserved. Send '{}' to start a new session.",
            self.config.start_phrase
        )
    }

    /// Handles one inbound message.
    ///
    /// Returns `Ok(None)` when the message must go unanswered.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails or the turn cannot
    /// produce a reply.
    #[instrument(skip(self, message), fields(agent = %message.to, user = %message.from))]
    pub async fn handle(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<String>, Report<ChatError>> {
        let agent = &message.to;
        let user = &message.from;

        match self.command(&message.body) {
            Some(Command::Start) => {
                info!("start command");
                if self.sessions.get(agent, user).await.map_err(ChatError::from)?.is_some() {
                    return Ok(Some(ALREADY_ACTIVE_REPLY.to_string()));
                }
                self.sessions
                    .create(agent, user, &self.config.default_timezone)
                    .await
                    .map_err(ChatError::from)?;
                Ok(Some(self.welcome_reply()))
            }
            Some(Command::End) => {
                info!("end command");
                if self.sessions.get(agent, user).await.map_err(ChatError::from)?.is_none() {
                    return Ok(Some(NO_SESSION_REPLY.to_string()));
                }
                self.sessions
                    .delete(agent, user)
                    .await
                    .map_err(ChatError::from)?;
                Ok(Some(self.goodbye_reply()))
            }
            None => {
                let Some(session) = self.sessions.get(agent, user).await.map_err(ChatError::from)?
                else {
                    warn!("message without a session ignored");
                    return Ok(None);
                };
                let reply = self.chat.chat(message, &session).await?;
                Ok(Some(reply))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HistoryError, MemoryError};
    use crate::history::{HistoryEntry, HistoryLog, Role};
    use crate::memory::{MemoryCategory, MemoryEntry, MemoryStore};
    use crate::memory_backend::{InMemoryHistoryLog, InMemoryMemoryStore, InMemorySessionRegistry};
    use crate::orchestrator::Orchestrator;
    use recall_ai::{ChatRequest, ChatResponse, LlmBackend, LlmError};
    use recall_core::{AgentAddress, MemoryEntryId, UserAddress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingChat {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatHandler for CountingChat {
        async fn chat(
            &self,
            message: &InboundMessage,
            _session: &Session,
        ) -> Result<String, Report<ChatError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {}", message.body))
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatHandler for FailingChat {
        async fn chat(
            &self,
            _message: &InboundMessage,
            _session: &Session,
        ) -> Result<String, Report<ChatError>> {
            Err(ChatError::Upstream {
                reason: "model unavailable".to_string(),
            }
            .into())
        }
    }

    #[derive(Default)]
    struct CountingMemory {
        inner: InMemoryMemoryStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MemoryStore for CountingMemory {
        async fn save(
            &self,
            agent: &AgentAddress,
            user: &UserAddress,
            category: MemoryCategory,
            content: &str,
        ) -> Result<MemoryEntry, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.save(agent, user, category, content).await
        }

        async fn list(&self, agent: &AgentAddress) -> Result<Vec<MemoryEntry>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list(agent).await
        }

        async fn delete(
            &self,
            agent: &AgentAddress,
            id: MemoryEntryId,
        ) -> Result<MemoryEntry, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(agent, id).await
        }
    }

    #[derive(Default)]
    struct CountingHistory {
        inner: InMemoryHistoryLog,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HistoryLog for CountingHistory {
        async fn append(
            &self,
            agent: &AgentAddress,
            user: &UserAddress,
            role: Role,
            content: &str,
        ) -> Result<HistoryEntry, HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.append(agent, user, role, content).await
        }

        async fn get_ordered(
            &self,
            agent: &AgentAddress,
            user: &UserAddress,
        ) -> Result<Vec<HistoryEntry>, HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_ordered(agent, user).await
        }
    }

    struct CannedBackend;

    #[async_trait]
    impl LlmBackend for CannedBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse::answer("noted"))
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    const AGENT: &str = "+15550000000";
    const USER: &str = "+15551111111";

    fn inbound(body: &str) -> InboundMessage {
        InboundMessage::from_parts(Some(body), Some(USER), Some(AGENT)).unwrap()
    }

    fn router(
        sessions: Arc<InMemorySessionRegistry>,
        chat: Arc<dyn ChatHandler>,
    ) -> CommandRouter {
        CommandRouter::new(sessions, chat, CommandConfig::default())
    }

    async fn session_count(sessions: &InMemorySessionRegistry) -> usize {
        sessions
            .get_all(&AgentAddress::new(AGENT))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn start_twice_creates_one_session() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions.clone(), Arc::new(CountingChat::default()));

        let first = router.handle(&inbound("hello recall")).await.unwrap();
        let second = router.handle(&inbound("hello recall")).await.unwrap();

        assert_eq!(first, Some(router.welcome_reply()));
        assert_eq!(second.as_deref(), Some(ALREADY_ACTIVE_REPLY));
        assert_eq!(session_count(&sessions).await, 1);
    }

    #[tokio::test]
    async fn new_session_gets_default_timezone() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions.clone(), Arc::new(CountingChat::default()));

        router.handle(&inbound("hello recall")).await.unwrap();

        let session = sessions
            .get(&AgentAddress::new(AGENT), &UserAddress::new(USER))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.timezone, "America/Los_Angeles");
    }

    #[tokio::test]
    async fn end_without_session_changes_nothing() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions.clone(), Arc::new(CountingChat::default()));

        let reply = router.handle(&inbound("goodbye recall")).await.unwrap();

        assert_eq!(reply.as_deref(), Some(NO_SESSION_REPLY));
        assert_eq!(session_count(&sessions).await, 0);
    }

    #[tokio::test]
    async fn end_closes_session_and_mentions_start_phrase() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions.clone(), Arc::new(CountingChat::default()));

        router.handle(&inbound("hello recall")).await.unwrap();
        let reply = router.handle(&inbound("goodbye recall")).await.unwrap().unwrap();

        assert!(reply.contains("preserved"));
        assert!(reply.contains("'hello recall'"));
        assert_eq!(session_count(&sessions).await, 0);
    }

    #[tokio::test]
    async fn phrases_ignore_case_and_whitespace() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions.clone(), Arc::new(CountingChat::default()));

        let reply = router.handle(&inbound("  Hello Recall \n")).await.unwrap();
        assert_eq!(reply, Some(router.welcome_reply()));

        let reply = router.handle(&inbound("hello recall")).await.unwrap();
        assert_eq!(reply.as_deref(), Some(ALREADY_ACTIVE_REPLY));

        let reply = router.handle(&inbound(" GOODBYE recall")).await.unwrap().unwrap();
        assert!(reply.starts_with("Goodbye!"));
    }

    #[tokio::test]
    async fn message_without_session_gets_no_reply() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let chat = Arc::new(CountingChat::default());
        let router = router(sessions, chat.clone());

        let reply = router.handle(&inbound("what's on my list?")).await.unwrap();

        assert_eq!(reply, None);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gated_message_never_touches_memory_or_history() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let memory = Arc::new(CountingMemory::default());
        let history = Arc::new(CountingHistory::default());
        let orchestrator = Orchestrator::new(Arc::new(CannedBackend), memory.clone(), history.clone());
        let router = router(sessions, Arc::new(orchestrator));

        let reply = router.handle(&inbound("save this please")).await.unwrap();

        assert_eq!(reply, None);
        assert_eq!(memory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(history.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn message_with_session_is_delegated() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let chat = Arc::new(CountingChat::default());
        let router = router(sessions, chat.clone());

        router.handle(&inbound("hello recall")).await.unwrap();
        let reply = router.handle(&inbound("buy eggs")).await.unwrap();

        assert_eq!(reply.as_deref(), Some("echo: buy eggs"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ending_a_session_keeps_memory() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let memory = Arc::new(InMemoryMemoryStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(CannedBackend),
            memory.clone(),
            Arc::new(InMemoryHistoryLog::new()),
        );
        let router = router(sessions, Arc::new(orchestrator));
        let agent = AgentAddress::new(AGENT);

        router.handle(&inbound("hello recall")).await.unwrap();
        memory
            .save(&agent, &UserAddress::new(USER), MemoryCategory::Todo, "water plants")
            .await
            .unwrap();
        router.handle(&inbound("goodbye recall")).await.unwrap();

        let kept = memory.list(&agent).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert!(!kept[0].is_deleted());
    }

    #[tokio::test]
    async fn chat_failure_propagates() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let router = router(sessions, Arc::new(FailingChat));

        router.handle(&inbound("hello recall")).await.unwrap();
        let result = router.handle(&inbound("anything")).await;

        assert!(result.is_err());
    }
}
