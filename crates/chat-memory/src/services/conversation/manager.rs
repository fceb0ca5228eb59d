use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::chat::{Message, Role, SessionId};
use crate::utils::error::{MemoryError, MemoryResult};
use crate::utils::metrics::TurnMetrics;

use super::store::SessionStore;
use super::token_counter::CostEstimator;
use super::types::{MemoryStats, SessionContext, WindowConfig};
use super::window::{Window, WindowPolicy};

/// Trait for the text-generation service
///
/// Receives the window in chronological order. Any prompt framing (system
/// instructions, templates) is the implementor's business. Retries, if any,
/// belong here too; the manager calls exactly once per turn.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationInvoker: Send + Sync {
    async fn generate(&self, window: &[Message], context: &SessionContext) -> Result<String>;
}

pub struct MemoryManager {
    store: Arc<SessionStore>,
    policy: WindowPolicy,
    estimator: Arc<dyn CostEstimator>,
    invoker: Arc<dyn GenerationInvoker>,
    metrics: TurnMetrics,
}

impl MemoryManager {
    pub fn new(
        store: Arc<SessionStore>,
        window: WindowConfig,
        estimator: Arc<dyn CostEstimator>,
        invoker: Arc<dyn GenerationInvoker>,
    ) -> Self {
        info!(
            "Memory manager ready: budget={}, strategy={:?}, include_system={}",
            window.budget, window.strategy, window.include_system
        );
        Self {
            store,
            policy: WindowPolicy::new(window),
            estimator,
            invoker,
            metrics: TurnMetrics::new(),
        }
    }

    /// One human turn: record input, cut window, generate, record reply
    pub async fn turn(&self, session_id: &str, input: impl Into<String>) -> MemoryResult<Message> {
        self.run_turn(session_id, Role::Human, input.into(), None).await
    }

    pub async fn turn_as(
        &self,
        session_id: &str,
        role: Role,
        input: impl Into<String>,
    ) -> MemoryResult<Message> {
        self.run_turn(session_id, role, input.into(), None).await
    }

    /// Like `turn_as`, but gives up with `Cancelled` once `cancel` fires.
    ///
    /// Cancelling while queued behind another turn on the same session
    /// appends nothing. Cancelling during generation keeps the input message
    /// and appends no reply.
    pub async fn turn_with_cancel(
        &self,
        session_id: &str,
        role: Role,
        input: impl Into<String>,
        cancel: &CancellationToken,
    ) -> MemoryResult<Message> {
        self.run_turn(session_id, role, input.into(), Some(cancel)).await
    }

    async fn run_turn(
        &self,
        session_id: &str,
        role: Role,
        input: String,
        cancel: Option<&CancellationToken>,
    ) -> MemoryResult<Message> {
        let session_id = SessionId::parse(session_id)?;
        let session = self.store.get_or_create_parsed(session_id.clone());

        // Held until the reply is appended; same-session turns queue here
        let _turn = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.metrics.inc_cancelled();
                    debug!("Turn for session {} cancelled while queued", session_id);
                    return Err(MemoryError::Cancelled);
                }
                guard = session.lock_turn() => guard,
            },
            None => session.lock_turn().await,
        };

        self.metrics.inc_started();
        let input_message = session.append(role, input);
        debug!(
            "Session {} appended {} message #{}",
            session_id,
            role,
            input_message.sequence()
        );

        let log = session.snapshot();
        let window = match self.policy.select_window(&log, self.estimator.as_ref()) {
            Ok(window) => window,
            Err(e) => {
                self.metrics.inc_estimation_failure();
                warn!("Window selection failed for session {}: {}", session_id, e);
                return Err(e);
            }
        };

        let context = SessionContext {
            session_id: session_id.clone(),
            history_len: log.len(),
            window_cost: window.cost,
        };

        let generation = self.invoker.generate(&window.messages, &context);
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = generation => Some(result),
            },
            None => Some(generation.await),
        };

        let response = match outcome {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                self.metrics.inc_generation_failure();
                warn!("Generation failed for session {}: {:#}", session_id, e);
                return Err(MemoryError::GenerationFailed(e));
            }
            None => {
                self.metrics.inc_cancelled();
                info!("Turn for session {} cancelled during generation", session_id);
                return Err(MemoryError::Cancelled);
            }
        };

        let reply = session.append(Role::Assistant, response);
        self.metrics.inc_completed();
        debug!(
            "Session {} turn complete: window {}/{} messages, reply #{}",
            session_id,
            window.messages.len(),
            log.len(),
            reply.sequence()
        );

        Ok(reply)
    }

    /// Full history of a session, oldest first
    pub fn snapshot(&self, session_id: &str) -> MemoryResult<Vec<Message>> {
        self.store.snapshot(session_id)
    }

    /// Window the next turn would start from, before its input is appended
    pub fn current_window(&self, session_id: &str) -> MemoryResult<Window> {
        let log = self.store.snapshot(session_id)?;
        self.policy.select_window(&log, self.estimator.as_ref())
    }

    /// Get number of active sessions
    pub fn session_count(&self) -> usize {
        self.store.session_count()
    }

    /// Messages stored for one session
    pub fn message_count(&self, session_id: &str) -> MemoryResult<usize> {
        self.store.message_count(session_id)
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn window_config(&self) -> &WindowConfig {
        self.policy.config()
    }

    /// Store sizes plus turn counters since startup
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            active_sessions: self.store.session_count(),
            total_messages: self.store.total_messages(),
            turns_started: self.metrics.turns_started(),
            turns_completed: self.metrics.turns_completed(),
            generation_failures: self.metrics.generation_failures(),
            estimation_failures: self.metrics.estimation_failures(),
            cancellations: self.metrics.cancellations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::token_counter::MessageCounter;
    use std::time::Duration;

    struct Echo;

    #[async_trait::async_trait]
    impl GenerationInvoker for Echo {
        async fn generate(&self, window: &[Message], _ctx: &SessionContext) -> Result<String> {
            let last = window.last().map(|m| m.content()).unwrap_or_default();
            Ok(format!("echo: {last}"))
        }
    }

    /// Never finishes on its own
    struct Hang;

    #[async_trait::async_trait]
    impl GenerationInvoker for Hang {
        async fn generate(&self, _window: &[Message], _ctx: &SessionContext) -> Result<String> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn manager_with(invoker: Arc<dyn GenerationInvoker>, window: WindowConfig) -> MemoryManager {
        MemoryManager::new(
            Arc::new(SessionStore::new()),
            window,
            Arc::new(MessageCounter),
            invoker,
        )
    }

    #[tokio::test]
    async fn test_turn_appends_input_and_reply() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::default());

        let reply = manager.turn("user_session_1", "Hello! My name is John.").await.unwrap();

        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.content(), "echo: Hello! My name is John.");
        assert_eq!(reply.sequence(), 1);

        let log = manager.snapshot("user_session_1").unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].same_turn(Role::Human, "Hello! My name is John."));
        assert_eq!(log[1], reply);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_human_message() {
        let mut mock = MockGenerationInvoker::new();
        mock.expect_generate()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("upstream 503")));
        let manager = manager_with(Arc::new(mock), WindowConfig::default());

        let err = manager.turn("s3", "hello").await.unwrap_err();

        assert!(matches!(err, MemoryError::GenerationFailed(_)));
        assert!(err.to_string().contains("upstream 503"));
        let log = manager.snapshot("s3").unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].same_turn(Role::Human, "hello"));
        assert_eq!(manager.stats().generation_failures, 1);
    }

    #[tokio::test]
    async fn test_invoker_receives_window_and_context() {
        let mut mock = MockGenerationInvoker::new();
        mock.expect_generate()
            .withf(|window, ctx| {
                let contents: Vec<&str> = window.iter().map(|m| m.content()).collect();
                contents == vec!["rules", "c"] && ctx.history_len == 4 && ctx.window_cost == 2
            })
            .times(1)
            .returning(|_, _| Ok("done".to_string()));
        let manager = manager_with(Arc::new(mock), WindowConfig::pinned(2));

        let store = manager.store().clone();
        store.append("s2", Role::System, "rules").unwrap();
        store.append("s2", Role::Human, "a").unwrap();
        store.append("s2", Role::Assistant, "b").unwrap();

        let reply = manager.turn("s2", "c").await.unwrap();
        assert_eq!(reply.content(), "done");
        assert_eq!(manager.message_count("s2").unwrap(), 5);
    }

    #[tokio::test]
    async fn test_estimation_failure_surfaces() {
        let failing = |_: &[Message]| -> Result<usize> { anyhow::bail!("no tokenizer") };
        let mut mock = MockGenerationInvoker::new();
        mock.expect_generate().never();
        let manager = MemoryManager::new(
            Arc::new(SessionStore::new()),
            WindowConfig::default(),
            Arc::new(failing),
            Arc::new(mock),
        );

        let err = manager.turn("s1", "hi").await.unwrap_err();

        assert!(matches!(err, MemoryError::EstimationFailed(_)));
        assert_eq!(manager.message_count("s1").unwrap(), 1);
        assert_eq!(manager.stats().estimation_failures, 1);
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::default());
        let err = manager.turn("", "hi").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidSessionId { .. }));
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_generation() {
        let manager = Arc::new(manager_with(Arc::new(Hang), WindowConfig::default()));
        let token = CancellationToken::new();

        let task = {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move {
                manager
                    .turn_with_cancel("s1", Role::Human, "slow question", &token)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let err = task.await.unwrap().unwrap_err();

        assert!(matches!(err, MemoryError::Cancelled));
        let log = manager.snapshot("s1").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role(), Role::Human);
        assert_eq!(manager.stats().cancellations, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_appends_nothing() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = manager
            .turn_with_cancel("s1", Role::Human, "never", &token)
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::Cancelled));
        assert_eq!(manager.message_count("s1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_queued_behind_turn() {
        let manager = Arc::new(manager_with(Arc::new(Hang), WindowConfig::default()));

        // First turn holds the session lock forever
        let holder = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.turn("s1", "first").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.message_count("s1").unwrap(), 1);

        let token = CancellationToken::new();
        let queued = {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move {
                manager
                    .turn_with_cancel("s1", Role::Human, "second", &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queued.is_finished());

        token.cancel();
        let err = queued.await.unwrap().unwrap_err();

        assert!(matches!(err, MemoryError::Cancelled));
        let log = manager.snapshot("s1").unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].same_turn(Role::Human, "first"));
        assert_eq!(manager.stats().turns_started, 1);
        assert_eq!(manager.stats().cancellations, 1);

        holder.abort();
    }

    #[tokio::test]
    async fn test_current_window_previews_next_turn() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::keep_last(2));
        manager.turn("s1", "one").await.unwrap();
        manager.turn("s1", "two").await.unwrap();

        let window = manager.current_window("s1").unwrap();
        assert_eq!(window.cost, 2);
        assert_eq!(window.messages, manager.snapshot("s1").unwrap()[2..].to_vec());

        let empty = manager.current_window("nobody").unwrap();
        assert!(empty.messages.is_empty());
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn test_turn_as_system() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::default());
        manager.turn_as("s1", Role::System, "be brief").await.unwrap();

        let log = manager.snapshot("s1").unwrap();
        assert_eq!(log[0].role(), Role::System);
        assert_eq!(log[1].content(), "echo: be brief");
    }

    #[tokio::test]
    async fn test_stats() {
        let manager = manager_with(Arc::new(Echo), WindowConfig::default());
        manager.turn("alice_123", "Hi").await.unwrap();
        manager.turn("bob_456", "Hello").await.unwrap();
        manager.turn("alice_123", "Again").await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_messages, 6);
        assert_eq!(stats.turns_started, 3);
        assert_eq!(stats.turns_completed, 3);
    }
}
