//! No-op retrieval — disables reference context entirely.

use async_trait::async_trait;
use ragstream_core::error::RetrievalError;
use ragstream_core::message::ConversationMessage;
use ragstream_core::retrieval::{RetrievalService, RetrievedChunk};

/// A retrieval service that never returns anything.
pub struct NoopRetrieval;

#[async_trait]
impl RetrievalService for NoopRetrieval {
    fn name(&self) -> &str {
        "none"
    }

    async fn get_chunks(
        &self,
        _query: &str,
        _conversation: &[ConversationMessage],
        _limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}
