//! Retrieval trait — ranked reference chunks for a query.
//!
//! How chunks are produced, embedded or ranked is the implementation's
//! business; the pipeline only asks for at most `limit` of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::message::ConversationMessage;

/// A unit of previously stored reference text returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The text content of this chunk
    pub text: String,

    /// Source document identifier (filename, URL, ...)
    pub source_id: String,

    /// Relevance score, higher is better
    #[serde(default)]
    pub score: f32,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            score,
        }
    }
}

/// The RetrievalService trait.
///
/// Implementations must treat `limit` as a hard ceiling and return chunks
/// ordered best-first.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Fetch up to `limit` chunks relevant to `query`.
    async fn get_chunks(
        &self,
        query: &str,
        conversation: &[ConversationMessage],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
