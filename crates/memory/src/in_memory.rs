//! In-memory backends — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use ragstream_core::error::{PersistenceError, RetrievalError};
use ragstream_core::message::{ConversationId, ConversationMessage};
use ragstream_core::persistence::{PersistenceGateway, TurnAck};
use ragstream_core::retrieval::{RetrievalService, RetrievedChunk};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::StoredTurn;

/// Query terms shorter than this are ignored for scoring.
const MIN_TERM_LEN: usize = 3;

/// A keyword-scored chunk store kept in a Vec.
///
/// Score = matched query terms, normalized by chunk length per 100 chars.
pub struct InMemoryRetrieval {
    chunks: Arc<RwLock<Vec<RetrievedChunk>>>,
}

impl InMemoryRetrieval {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Store a reference chunk.
    pub async fn add(&self, text: impl Into<String>, source_id: impl Into<String>) {
        self.chunks
            .write()
            .await
            .push(RetrievedChunk::new(text, source_id, 0.0));
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl RetrievalService for InMemoryRetrieval {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_chunks(
        &self,
        query: &str,
        _conversation: &[ConversationMessage],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut results: Vec<RetrievedChunk> = chunks
            .iter()
            .filter_map(|chunk| {
                let text_lower = chunk.text.to_lowercase();
                let matched = terms.iter().filter(|t| text_lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                let mut scored = chunk.clone();
                scored.score = matched as f32 / (chunk.text.len() as f32 / 100.0).max(1.0);
                Some(scored)
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }
}

/// A turn store that keeps saved turns in a Vec.
pub struct InMemoryTurnStore {
    turns: Arc<RwLock<Vec<StoredTurn>>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// All turns saved for a conversation, oldest first.
    pub async fn turns_for(&self, conversation_id: &ConversationId) -> Vec<StoredTurn> {
        self.turns
            .read()
            .await
            .iter()
            .filter(|t| &t.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.turns.read().await.len()
    }
}

impl Default for InMemoryTurnStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryTurnStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_turn(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<TurnAck, PersistenceError> {
        let turn = StoredTurn {
            turn_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            user_message: user_message.to_string(),
            assistant_message: assistant_message.to_string(),
            saved_at: Utc::now(),
        };
        let ack = TurnAck {
            turn_id: turn.turn_id.clone(),
            saved_at: turn.saved_at,
        };
        self.turns.write().await.push(turn);
        Ok(ack)
    }
}
