//! The chat session — one conversation, one turn at a time.
//!
//! ```text
//!            submit                decoded              saved
//!   Idle ───────────▶ Streaming ───────────▶ Saving ───────────▶ Idle
//!    ▲                   │ cancel                │
//!    │                   └──────────▶ Idle       │ failure
//!    │                                           ▼
//!    └───────────── next submit ─────────── Error(msg)
//! ```
//!
//! A turn runs: validate → budget plan → retrieve → assemble → open stream
//! → decode → persist once → append to history. Submitting while a turn is
//! streaming or saving is rejected with [`SessionError::TurnInFlight`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ragstream_config::AppConfig;
use ragstream_core::error::{DecodeError, Error, SessionError, ValidationError};
use ragstream_core::message::{ConversationId, ConversationMessage, Turn};
use ragstream_core::persistence::{PersistenceGateway, TurnAck};
use ragstream_core::retrieval::RetrievalService;
use ragstream_core::stream::CompletionMetrics;
use ragstream_core::transport::{ChatOptions, ChatRequest, ChatTransport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{
    BudgetPlan, BudgetPolicy, CharHeuristicEstimator, ContextBudgeter, ConversationAssembler,
    TokenEstimator,
};
use crate::stream::{
    IdentityTransformer, RenderEvent, SpellingNormalizer, StreamDecoder, TextTransformer,
};
use crate::turn::TurnTracker;

/// Explicit per-session settings. Built from [`AppConfig`] by the caller;
/// nothing in the session reads the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: Option<String>,
    pub system_prompt: String,
    pub context_window: usize,
    pub budget: BudgetPolicy,
    pub options: Option<ChatOptions>,
    pub normalize_spelling: bool,
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            system_prompt: config.system_prompt.clone(),
            context_window: config.context_window,
            budget: BudgetPolicy {
                reserve_fraction: config.budget.reserve_fraction,
                avg_tokens_per_chunk: config.budget.avg_tokens_per_chunk,
            },
            options: config.options.clone(),
            normalize_spelling: config.normalize_spelling,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Saving,
    Error(String),
}

impl SessionState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Streaming | Self::Saving)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Saving => "saving",
            Self::Error(_) => "error",
        }
    }
}

/// What a successful turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: Turn,
    pub ack: TurnAck,
    pub plan: BudgetPlan,
    pub chunks_used: usize,
    pub metrics: Option<CompletionMetrics>,
}

pub struct ChatSession {
    conversation_id: ConversationId,
    config: SessionConfig,
    transport: Arc<dyn ChatTransport>,
    retrieval: Arc<dyn RetrievalService>,
    persistence: Arc<dyn PersistenceGateway>,
    budgeter: ContextBudgeter,
    assembler: ConversationAssembler,
    transformer: Arc<dyn TextTransformer>,
    state: Mutex<SessionState>,
    history: Mutex<Vec<ConversationMessage>>,
    tracker: Mutex<TurnTracker>,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn ChatTransport>,
        retrieval: Arc<dyn RetrievalService>,
        persistence: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let transformer: Arc<dyn TextTransformer> = if config.normalize_spelling {
            Arc::new(SpellingNormalizer::british())
        } else {
            Arc::new(IdentityTransformer)
        };
        let budgeter =
            ContextBudgeter::new(config.budget, Arc::new(CharHeuristicEstimator::default()));

        Self {
            conversation_id: ConversationId::new(),
            config,
            transport,
            retrieval,
            persistence,
            budgeter,
            assembler: ConversationAssembler::new(),
            transformer,
            state: Mutex::new(SessionState::Idle),
            history: Mutex::new(Vec::new()),
            tracker: Mutex::new(TurnTracker::new()),
        }
    }

    pub fn with_conversation_id(mut self, id: ConversationId) -> Self {
        self.conversation_id = id;
        self
    }

    /// Seed prior turns, oldest first.
    pub fn with_history(self, history: Vec<ConversationMessage>) -> Self {
        *lock(&self.history) = history;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn TextTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.budgeter = ContextBudgeter::new(self.config.budget, estimator);
        self
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        lock(&self.state).clone()
    }

    pub fn history(&self) -> Vec<ConversationMessage> {
        lock(&self.history).clone()
    }

    /// Budget plan the next turn would use for `user_message`.
    pub fn plan_for(&self, user_message: &str) -> BudgetPlan {
        let history = lock(&self.history);
        self.budgeter.plan(
            self.config.context_window,
            &self.config.system_prompt,
            &history,
            user_message,
        )
    }

    /// Run one turn to completion.
    ///
    /// Render events are published on `events` as the reply streams. Firing
    /// `cancel` abandons the turn: the pending tail is discarded and nothing
    /// is persisted.
    pub async fn submit(
        &self,
        user_message: &str,
        events: Option<&mpsc::Sender<RenderEvent>>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let guard = self.begin_turn()?;

        match self.run_turn(user_message, events, cancel).await {
            Ok(outcome) => {
                guard.finish(SessionState::Idle);
                Ok(outcome)
            }
            Err(Error::Session(SessionError::Cancelled)) => {
                info!(conversation = %self.conversation_id, "Turn cancelled");
                guard.finish(SessionState::Idle);
                Err(SessionError::Cancelled.into())
            }
            Err(e) => {
                warn!(conversation = %self.conversation_id, error = %e, "Turn failed");
                guard.finish(SessionState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn begin_turn(&self) -> Result<TurnGuard<'_>, SessionError> {
        let mut state = lock(&self.state);
        if state.is_busy() {
            return Err(SessionError::TurnInFlight {
                state: state.label().to_string(),
            });
        }
        *state = SessionState::Streaming;
        Ok(TurnGuard {
            session: self,
            armed: true,
        })
    }

    async fn run_turn(
        &self,
        user_message: &str,
        events: Option<&mpsc::Sender<RenderEvent>>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let model = self.validate(user_message)?;
        let history = self.history();

        let plan = self.budgeter.plan(
            self.config.context_window,
            &self.config.system_prompt,
            &history,
            user_message,
        );
        debug!(
            max_chunks = plan.max_chunks,
            available = plan.available_token_budget,
            "Budget planned"
        );
        if plan.is_overcommitted(self.config.budget.avg_tokens_per_chunk) {
            warn!(
                max_chunks = plan.max_chunks,
                available = plan.available_token_budget,
                "Minimum retrieval context exceeds the remaining window"
            );
        }

        let chunks = self
            .assembler
            .retrieve(self.retrieval.as_ref(), user_message, &history, &plan)
            .await?;
        let messages =
            self.assembler
                .assemble(&history, user_message, &self.config.system_prompt, &chunks);
        let request = ChatRequest::streaming(model, messages, self.config.options.clone());

        lock(&self.tracker).begin(self.conversation_id.clone(), user_message);

        debug!(
            transport = self.transport.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Opening stream"
        );
        let stream = self.transport.open_stream(&request).await?;

        let mut decoder = StreamDecoder::new(self.transformer.clone());
        let decoded = decoder.run(stream, events, cancel).await?;

        let pending = {
            let mut tracker = lock(&self.tracker);
            tracker.record_response(decoded.text.clone());
            tracker.on_completion()
        };
        let Some(pending) = pending else {
            return Err(DecodeError::EmptyResponse.into());
        };

        self.set_state(SessionState::Saving);
        let ack = self
            .persistence
            .save_turn(
                &pending.conversation_id,
                &pending.user_message,
                &pending.assistant_message,
            )
            .await?;
        lock(&self.tracker).acknowledge();

        let turn = Turn::new(pending.user_message, pending.assistant_message);
        lock(&self.history).extend(turn.to_messages());

        info!(
            conversation = %self.conversation_id,
            turn_id = %ack.turn_id,
            store = self.persistence.name(),
            chunks = chunks.len(),
            "Turn saved"
        );

        Ok(TurnOutcome {
            turn,
            ack,
            plan,
            chunks_used: chunks.len(),
            metrics: decoded.metrics,
        })
    }

    fn validate(&self, user_message: &str) -> Result<String, ValidationError> {
        if user_message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        self.config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .ok_or(ValidationError::MissingModel)
    }

    fn set_state(&self, next: SessionState) {
        *lock(&self.state) = next;
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation_id", &self.conversation_id)
            .field("transport", &self.transport.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Resets the session if the submit future is dropped mid-turn.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    armed: bool,
}

impl TurnGuard<'_> {
    fn finish(mut self, state: SessionState) {
        self.armed = false;
        lock(&self.session.tracker).abandon();
        self.session.set_state(state);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Turn dropped before completion; resetting session");
            lock(&self.session.tracker).abandon();
            self.session.set_state(SessionState::Idle);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingGateway, Script, ScriptedTransport, StaticRetrieval, ndjson};
    use ragstream_core::error::TransportError;
    use ragstream_core::message::Role;
    use ragstream_core::retrieval::RetrievedChunk;

    fn config() -> SessionConfig {
        SessionConfig {
            model: Some("mock-model".into()),
            system_prompt: "Be terse.".into(),
            context_window: 4096,
            budget: BudgetPolicy::default(),
            options: None,
            normalize_spelling: false,
        }
    }

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        retrieval: Arc<StaticRetrieval>,
        gateway: Arc<RecordingGateway>,
        session: ChatSession,
    }

    fn fixture(config: SessionConfig, transport: ScriptedTransport) -> Fixture {
        fixture_with(config, transport, RecordingGateway::new())
    }

    fn fixture_with(
        config: SessionConfig,
        transport: ScriptedTransport,
        gateway: RecordingGateway,
    ) -> Fixture {
        let transport = Arc::new(transport);
        let retrieval = Arc::new(StaticRetrieval::new(vec![
            RetrievedChunk::new("Rust is memory safe", "rust.md", 0.9),
            RetrievedChunk::new("Cargo builds crates", "cargo.md", 0.5),
        ]));
        let gateway = Arc::new(gateway);
        let session = ChatSession::new(
            config,
            transport.clone(),
            retrieval.clone(),
            gateway.clone(),
        )
        .with_conversation_id(ConversationId::from("conv-1"));
        Fixture {
            transport,
            retrieval,
            gateway,
            session,
        }
    }

    #[tokio::test]
    async fn successful_turn_saves_once_and_extends_history() {
        let fx = fixture(
            config(),
            ScriptedTransport::replying(&[("Hel", false), ("lo wor", false), ("ld.", true)]),
        );

        let outcome = fx
            .session
            .submit("hi there", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.turn.assistant_message, "Hello world.");
        assert_eq!(outcome.plan.max_chunks, 5);
        assert_eq!(outcome.chunks_used, 2);
        assert_eq!(fx.session.state(), SessionState::Idle);
        assert_eq!(
            fx.gateway.saves(),
            vec![(
                ConversationId::from("conv-1"),
                "hi there".to_string(),
                "Hello world.".to_string()
            )]
        );
        assert_eq!(
            fx.session.history(),
            vec![
                ConversationMessage::user("hi there"),
                ConversationMessage::assistant("Hello world.")
            ]
        );
    }

    #[tokio::test]
    async fn request_carries_assembled_prompt() {
        let mut cfg = config();
        cfg.options = Some(ChatOptions {
            temperature: Some(0.2),
            ..Default::default()
        });
        let fx = fixture(cfg, ScriptedTransport::replying(&[("ok", true)]));
        let fx_session = fx
            .session
            .with_history(vec![
                ConversationMessage::user("earlier"),
                ConversationMessage::assistant("reply"),
            ]);

        fx_session
            .submit("now", None, &CancellationToken::new())
            .await
            .unwrap();

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.model, "mock-model");
        assert!(req.stream);
        assert_eq!(req.options.as_ref().and_then(|o| o.temperature), Some(0.2));

        let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(req.messages[0].content.contains("[Source: rust.md]"));
        assert_eq!(req.messages[3].content, "now");
        assert_eq!(fx.retrieval.limits(), vec![5]);
    }

    #[tokio::test]
    async fn validation_rejects_before_any_request() {
        let fx = fixture(config(), ScriptedTransport::new(vec![]));
        let err = fx
            .session
            .submit("   ", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::EmptyMessage)
        ));
        assert!(fx.transport.requests().is_empty());
        assert!(matches!(fx.session.state(), SessionState::Error(_)));

        let mut cfg = config();
        cfg.model = None;
        let fx = fixture(cfg, ScriptedTransport::new(vec![]));
        let err = fx
            .session
            .submit("hello", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingModel)
        ));
        assert!(fx.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_sets_error_state_without_saving() {
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![Script::Fail(TransportError::Status {
                status_code: 404,
                message: "model 'mock-model' not found".into(),
            })]),
        );
        let err = fx
            .session
            .submit("hello", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Status { .. })));
        assert_eq!(
            fx.session.state(),
            SessionState::Error(err.to_string())
        );
        assert!(fx.gateway.saves().is_empty());
        assert!(fx.session.history().is_empty());
    }

    #[tokio::test]
    async fn error_state_replaced_by_next_success() {
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![
                Script::Fail(TransportError::NoBody),
                Script::Chunks(vec![ndjson(&[("fine", true)]).into_bytes()]),
            ]),
        );
        let cancel = CancellationToken::new();

        assert!(fx.session.submit("one", None, &cancel).await.is_err());
        assert!(matches!(fx.session.state(), SessionState::Error(_)));

        fx.session.submit("two", None, &cancel).await.unwrap();
        assert_eq!(fx.session.state(), SessionState::Idle);
        assert_eq!(fx.gateway.saves().len(), 1);
    }

    #[tokio::test]
    async fn empty_response_is_not_persisted() {
        let fx = fixture(config(), ScriptedTransport::replying(&[("", true)]));
        let err = fx
            .session
            .submit("hello", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::EmptyResponse)));
        assert!(fx.gateway.saves().is_empty());
    }

    #[tokio::test]
    async fn cancellation_after_first_chunk_never_persists() {
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![Script::ChunksThenHang(vec![
                ndjson(&[("partial answ", false)]).into_bytes(),
            ])]),
        );
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);

        let submit = fx.session.submit("hello", Some(&tx), &cancel);
        let watcher = async {
            let first = rx.recv().await;
            cancel.cancel();
            first
        };
        let (result, first) = tokio::join!(submit, watcher);

        assert!(matches!(first, Some(RenderEvent::Chunk { .. })));
        assert!(matches!(result, Err(Error::Session(SessionError::Cancelled))));
        assert!(fx.gateway.saves().is_empty());
        assert!(fx.session.history().is_empty());
        assert_eq!(fx.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn cancellation_with_unread_receiver_returns_to_idle() {
        let chunks: Vec<Vec<u8>> = (0..10)
            .map(|i| ndjson(&[(&format!("word{i} "), false)]).into_bytes())
            .collect();
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![
                Script::ChunksThenHang(chunks),
                Script::Chunks(vec![ndjson(&[("next", true)]).into_bytes()]),
            ]),
        );
        let cancel = CancellationToken::new();
        // Receiver stays alive but is never read.
        let (tx, _rx) = mpsc::channel(1);

        let submit = fx.session.submit("hello", Some(&tx), &cancel);
        let canceller = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(submit, canceller)
        })
        .await
        .expect("submit must return once cancelled");

        assert!(matches!(result, Err(Error::Session(SessionError::Cancelled))));
        assert_eq!(fx.session.state(), SessionState::Idle);
        assert!(fx.gateway.saves().is_empty());

        let next = fx
            .session
            .submit("again", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(next.turn.assistant_message, "next");
    }

    #[tokio::test]
    async fn concurrent_submit_rejected() {
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![Script::ChunksThenHang(vec![
                ndjson(&[("slow", false)]).into_bytes(),
            ])]),
        );
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);

        let first = fx.session.submit("one", Some(&tx), &cancel);
        let second = async {
            rx.recv().await;
            let rejected = fx.session.submit("two", None, &cancel).await;
            cancel.cancel();
            rejected
        };
        let (_, rejected) = tokio::join!(first, second);

        assert!(matches!(
            rejected,
            Err(Error::Session(SessionError::TurnInFlight { .. }))
        ));
        assert_eq!(fx.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn dropped_submit_resets_to_idle() {
        let fx = fixture(
            config(),
            ScriptedTransport::new(vec![Script::ChunksThenHang(vec![])]),
        );
        let cancel = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            fx.session.submit("hello", None, &cancel),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(fx.session.state(), SessionState::Idle);
        assert!(fx.gateway.saves().is_empty());
    }

    #[tokio::test]
    async fn save_failure_is_surfaced_and_not_retried() {
        let fx = fixture_with(
            config(),
            ScriptedTransport::replying(&[("answer", true)]),
            RecordingGateway::failing(),
        );
        let err = fx
            .session
            .submit("hello", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert!(matches!(fx.session.state(), SessionState::Error(_)));
        assert!(fx.session.history().is_empty());
    }

    #[tokio::test]
    async fn spelling_normalized_in_saved_turn() {
        let mut cfg = config();
        cfg.normalize_spelling = true;
        let fx = fixture(
            cfg,
            ScriptedTransport::replying(&[("my favorite col", false), ("or", true)]),
        );

        let outcome = fx
            .session
            .submit("hello", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.turn.assistant_message, "my favourite colour");
    }

    #[test]
    fn config_from_app_config() {
        let mut app = AppConfig::default();
        app.default_model = Some("llama3".into());
        app.context_window = 8192;
        let cfg = SessionConfig::from_app_config(&app);
        assert_eq!(cfg.model.as_deref(), Some("llama3"));
        assert_eq!(cfg.context_window, 8192);
        assert_eq!(cfg.budget, BudgetPolicy::default());
        assert!(cfg.normalize_spelling);
    }
}
