//! End-to-end integration tests for the ragstream pipeline.
//!
//! These exercise a full turn from user message to persisted turn: budget
//! planning, retrieval, prompt assembly, stream decoding and storage, with a
//! scripted transport standing in for the chat endpoint.

use std::sync::{Arc, Mutex};

use ragstream_config::AppConfig;
use ragstream_core::error::{Error, SessionError, TransportError};
use ragstream_core::message::{ConversationId, ConversationMessage, Role};
use ragstream_core::transport::{ByteStream, ChatRequest, ChatTransport};
use ragstream_memory::{FileTurnStore, InMemoryRetrieval, InMemoryTurnStore, NoopRetrieval, history_from};
use ragstream_pipeline::{
    ChatSession, MAX_CHUNKS, MIN_CHUNKS, RenderEvent, SessionConfig, SessionState,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Mock Transport ───────────────────────────────────────────────────────

/// Replays one scripted NDJSON body per call, split into fixed-size chunks.
struct ScriptedTransport {
    bodies: Mutex<Vec<String>>,
    chunk_size: usize,
    hang: bool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    fn new(bodies: Vec<String>) -> Self {
        Self {
            bodies: Mutex::new(bodies),
            chunk_size: 5,
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn hanging(body: String) -> Self {
        Self {
            hang: true,
            ..Self::new(vec![body])
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        use futures::StreamExt;

        self.requests.lock().unwrap().push(request.clone());
        let mut bodies = self.bodies.lock().unwrap();
        if bodies.is_empty() {
            panic!("ScriptedTransport exhausted");
        }
        let body = bodies.remove(0);
        let chunks: Vec<Result<Vec<u8>, TransportError>> = body
            .as_bytes()
            .chunks(self.chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let stream = futures::stream::iter(chunks);
        let stream: ByteStream = if self.hang {
            Box::pin(stream.chain(futures::stream::pending()))
        } else {
            Box::pin(stream)
        };
        Ok(stream)
    }
}

fn ndjson(lines: &[(&str, bool)]) -> String {
    lines
        .iter()
        .map(|(content, done)| {
            format!(
                "{}\n",
                serde_json::json!({"message": {"role": "assistant", "content": content}, "done": done})
            )
        })
        .collect()
}

fn session_config() -> SessionConfig {
    let mut app = AppConfig::default();
    app.default_model = Some("llama3".into());
    app.system_prompt = "Answer from the reference material.".into();
    app.normalize_spelling = false;
    SessionConfig::from_app_config(&app)
}

async fn knowledge_base(docs: usize) -> Arc<InMemoryRetrieval> {
    let kb = InMemoryRetrieval::new();
    for i in 0..docs {
        kb.add(format!("Ownership fact number {i} about borrowing"), format!("doc-{i}"))
            .await;
    }
    Arc::new(kb)
}

fn sources_in(system: &ConversationMessage) -> usize {
    system.content.matches("[Source: ").count()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_turn_is_grounded_streamed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTurnStore::new(dir.path()));
    let transport = Arc::new(ScriptedTransport::new(vec![ndjson(&[
        ("Ownership ", false),
        ("means one ", false),
        ("owner.", true),
    ])]));
    let session = ChatSession::new(
        session_config(),
        transport.clone(),
        knowledge_base(3).await,
        store.clone(),
    )
    .with_conversation_id(ConversationId::from("e2e-1"));

    let outcome = session
        .submit("Explain ownership and borrowing", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.turn.assistant_message, "Ownership means one owner.");
    assert_eq!(outcome.chunks_used, 3);

    let requests = transport.requests();
    let request = &requests[0];
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(sources_in(&request.messages[0]), 3);
    assert_eq!(
        request.messages.last().map(|m| m.content.as_str()),
        Some("Explain ownership and borrowing")
    );

    let stored = store.load(&ConversationId::from("e2e-1")).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].assistant_message, "Ownership means one owner.");
}

#[tokio::test]
async fn e2e_resumed_conversation_sends_prior_turns() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTurnStore::new(dir.path()));
    let id = ConversationId::from("resume");
    let transport = Arc::new(ScriptedTransport::new(vec![
        ndjson(&[("First answer.", true)]),
        ndjson(&[("Second answer.", true)]),
    ]));

    let first = ChatSession::new(
        session_config(),
        transport.clone(),
        Arc::new(NoopRetrieval),
        store.clone(),
    )
    .with_conversation_id(id.clone());
    first
        .submit("first question", None, &CancellationToken::new())
        .await
        .unwrap();

    let history = history_from(&store.load(&id).await.unwrap());
    let second = ChatSession::new(
        session_config(),
        transport.clone(),
        Arc::new(NoopRetrieval),
        store.clone(),
    )
    .with_conversation_id(id.clone())
    .with_history(history);
    second
        .submit("second question", None, &CancellationToken::new())
        .await
        .unwrap();

    let contents: Vec<String> = transport.requests()[1]
        .messages
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(
        contents[1..],
        ["first question", "First answer.", "second question"]
    );
    assert_eq!(store.load(&id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn e2e_retrieval_respects_budget_ceiling() {
    let store = Arc::new(InMemoryTurnStore::new());
    let transport = Arc::new(ScriptedTransport::new(vec![ndjson(&[("ok", true)])]));
    let mut config = session_config();
    config.context_window = 1_000_000;

    let session = ChatSession::new(config, transport.clone(), knowledge_base(25).await, store);
    let outcome = session
        .submit("ownership borrowing", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.plan.max_chunks, MAX_CHUNKS);
    assert_eq!(sources_in(&transport.requests()[0].messages[0]), MAX_CHUNKS);
}

#[tokio::test]
async fn e2e_budget_pressure_floors_at_minimum() {
    let store = Arc::new(InMemoryTurnStore::new());
    let transport = Arc::new(ScriptedTransport::new(vec![ndjson(&[("ok", true)])]));
    let long_history: Vec<ConversationMessage> = (0..40)
        .flat_map(|i| {
            [
                ConversationMessage::user(format!("question {i} ").repeat(30)),
                ConversationMessage::assistant(format!("answer {i} ").repeat(60)),
            ]
        })
        .collect();

    let session = ChatSession::new(
        session_config(),
        transport.clone(),
        knowledge_base(25).await,
        store,
    )
    .with_history(long_history);
    let outcome = session
        .submit("ownership borrowing", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.plan.available_token_budget < 0.0);
    assert_eq!(outcome.plan.max_chunks, MIN_CHUNKS);
    assert_eq!(sources_in(&transport.requests()[0].messages[0]), MIN_CHUNKS);
}

#[tokio::test]
async fn e2e_render_events_are_word_safe() {
    let store = Arc::new(InMemoryTurnStore::new());
    let mut config = session_config();
    config.normalize_spelling = true;
    let mut body = ndjson(&[("The col", false), ("or of ", false)]);
    body.push_str("not-json\n");
    body.push_str(&ndjson(&[("hon", false), ("or.", true)]));
    let transport = Arc::new(ScriptedTransport::new(vec![body]));

    let session = ChatSession::new(config, transport, Arc::new(NoopRetrieval), store);
    let (tx, mut rx) = mpsc::channel(64);
    let outcome = session
        .submit("hi", Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    let mut stable = String::new();
    let mut done = 0;
    while let Some(event) = rx.recv().await {
        let text = event.stable_text().unwrap_or_default();
        assert!(text.starts_with(&stable), "stable text was revised");
        stable = text.to_string();
        if matches!(event, RenderEvent::Done { .. }) {
            done += 1;
        }
    }

    assert_eq!(done, 1);
    assert_eq!(stable, "The colour of honour.");
    assert_eq!(outcome.turn.assistant_message, "The colour of honour.");
}

#[tokio::test]
async fn e2e_cancelled_turn_leaves_no_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTurnStore::new(dir.path()));
    let id = ConversationId::from("cancelled");
    let transport = Arc::new(ScriptedTransport::hanging(ndjson(&[("partial ans", false)])));
    let session = ChatSession::new(
        session_config(),
        transport,
        Arc::new(NoopRetrieval),
        store.clone(),
    )
    .with_conversation_id(id.clone());

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(64);
    let submit = session.submit("hello", Some(&tx), &cancel);
    let canceller = async {
        rx.recv().await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(submit, canceller);

    assert!(matches!(result, Err(Error::Session(SessionError::Cancelled))));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(store.load(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn e2e_config_file_drives_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_model = "mistral"
context_window = 8192
normalize_spelling = false

[budget]
reserve_fraction = 0.5
avg_tokens_per_chunk = 250

[options]
temperature = 0.3
"#,
    )
    .unwrap();

    let app = AppConfig::load_from(&path).unwrap();
    let config = SessionConfig::from_app_config(&app);
    assert_eq!(config.model.as_deref(), Some("mistral"));
    assert_eq!(config.budget.avg_tokens_per_chunk, 250);

    let transport = Arc::new(ScriptedTransport::new(vec![ndjson(&[("ok", true)])]));
    let session = ChatSession::new(
        config,
        transport.clone(),
        Arc::new(NoopRetrieval),
        Arc::new(InMemoryTurnStore::new()),
    );
    session
        .submit("hello", None, &CancellationToken::new())
        .await
        .unwrap();

    let requests = transport.requests();
    let request = &requests[0];
    assert_eq!(request.model, "mistral");
    let body = serde_json::to_value(request).unwrap();
    assert_eq!(body["stream"], true);
    let temperature = body["options"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.3).abs() < 1e-6);
    assert_eq!(body["options"].as_object().unwrap().len(), 1);
}
