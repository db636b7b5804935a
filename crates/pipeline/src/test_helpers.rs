//! Shared test helpers: scripted collaborators and NDJSON builders.

use std::sync::Mutex;

use async_trait::async_trait;
use ragstream_core::error::{PersistenceError, RetrievalError, TransportError};
use ragstream_core::message::{ConversationId, ConversationMessage};
use ragstream_core::persistence::{PersistenceGateway, TurnAck};
use ragstream_core::retrieval::{RetrievalService, RetrievedChunk};
use ragstream_core::transport::{ByteStream, ChatRequest, ChatTransport};

/// Build an NDJSON body, one line per `(content, done)` pair.
pub fn ndjson(lines: &[(&str, bool)]) -> String {
    lines
        .iter()
        .map(|(content, done)| {
            format!(
                "{}\n",
                serde_json::json!({
                    "message": {"role": "assistant", "content": content},
                    "done": done,
                })
            )
        })
        .collect()
}

pub fn byte_stream(chunks: Vec<Vec<u8>>) -> ByteStream {
    Box::pin(futures::stream::iter(
        chunks.into_iter().map(Ok::<_, TransportError>),
    ))
}

/// How a [`ScriptedTransport`] answers `open_stream`.
#[derive(Clone)]
pub enum Script {
    /// Replay these chunks, then end.
    Chunks(Vec<Vec<u8>>),

    /// Replay these chunks, then hang until dropped.
    ChunksThenHang(Vec<Vec<u8>>),

    /// Refuse to open.
    Fail(TransportError),
}

/// A transport that replays scripted byte chunks, one script per call.
/// Panics if more calls are made than scripts provided.
pub struct ScriptedTransport {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A transport answering once with the given `(content, done)` lines.
    pub fn replying(lines: &[(&str, bool)]) -> Self {
        Self::new(vec![Script::Chunks(vec![ndjson(lines).into_bytes()])])
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            panic!("ScriptedTransport: no more scripts");
        }
        match scripts.remove(0) {
            Script::Chunks(chunks) => Ok(byte_stream(chunks)),
            Script::ChunksThenHang(chunks) => {
                use futures::StreamExt;
                Ok(Box::pin(byte_stream(chunks).chain(futures::stream::pending())))
            }
            Script::Fail(err) => Err(err),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        Ok(vec!["mock-model".into()])
    }
}

/// Records every save; optionally fails them all.
#[derive(Default)]
pub struct RecordingGateway {
    saves: Mutex<Vec<(ConversationId, String, String)>>,
    fail: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            saves: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn saves(&self) -> Vec<(ConversationId, String, String)> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn save_turn(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<TurnAck, PersistenceError> {
        if self.fail {
            return Err(PersistenceError::Storage("disk full".into()));
        }
        let mut saves = self.saves.lock().unwrap();
        saves.push((
            conversation_id.clone(),
            user_message.to_string(),
            assistant_message.to_string(),
        ));
        Ok(TurnAck::new(format!("turn-{}", saves.len())))
    }
}

/// Returns the same chunks for every query, honoring `limit`, and records
/// the limits it was asked for.
#[derive(Default)]
pub struct StaticRetrieval {
    chunks: Vec<RetrievedChunk>,
    limits: Mutex<Vec<usize>>,
}

impl StaticRetrieval {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            limits: Mutex::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalService for StaticRetrieval {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_chunks(
        &self,
        _query: &str,
        _conversation: &[ConversationMessage],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.limits.lock().unwrap().push(limit);
        Ok(self.chunks.iter().take(limit).cloned().collect())
    }
}
