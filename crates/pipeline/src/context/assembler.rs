//! Conversation assembly — the final prompt order.
//!
//! ```text
//! [system: base prompt + retrieved context] [history ...] [new user message]
//! ```
//!
//! History is trusted as complete and chronological: nothing is reordered,
//! deduplicated or trimmed here. Trimming is the budgeter's job, and it only
//! ever trims retrieved context.

use ragstream_core::error::RetrievalError;
use ragstream_core::message::ConversationMessage;
use ragstream_core::retrieval::{RetrievalService, RetrievedChunk};
use tracing::{debug, warn};

use super::budget::BudgetPlan;

const CONTEXT_HEADER: &str = "[Retrieved Knowledge]";

/// Builds the message list sent to the chat endpoint. Stateless.
#[derive(Debug, Clone, Default)]
pub struct ConversationAssembler;

impl ConversationAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Ask the retrieval service for at most `plan.max_chunks` chunks.
    ///
    /// A service returning more than asked for is truncated to the ceiling.
    pub async fn retrieve(
        &self,
        retrieval: &dyn RetrievalService,
        query: &str,
        history: &[ConversationMessage],
        plan: &BudgetPlan,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let mut chunks = retrieval.get_chunks(query, history, plan.max_chunks).await?;

        if chunks.len() > plan.max_chunks {
            warn!(
                service = retrieval.name(),
                returned = chunks.len(),
                limit = plan.max_chunks,
                "Retrieval ignored its limit; truncating"
            );
            chunks.truncate(plan.max_chunks);
        }

        debug!(
            service = retrieval.name(),
            chunks = chunks.len(),
            limit = plan.max_chunks,
            "Retrieved context"
        );
        Ok(chunks)
    }

    /// Assemble the final message sequence. The system message is always
    /// first and the new user message always last.
    pub fn assemble(
        &self,
        history: &[ConversationMessage],
        new_user_message: &str,
        system_prompt: &str,
        retrieved_context: &[RetrievedChunk],
    ) -> Vec<ConversationMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ConversationMessage::system(Self::system_content(
            system_prompt,
            retrieved_context,
        )));
        messages.extend(history.iter().cloned());
        messages.push(ConversationMessage::user(new_user_message));
        messages
    }

    fn system_content(system_prompt: &str, chunks: &[RetrievedChunk]) -> String {
        if chunks.is_empty() {
            return system_prompt.to_string();
        }

        let mut out = String::from(system_prompt);
        out.push_str("\n\n");
        out.push_str(CONTEXT_HEADER);
        out.push('\n');
        for chunk in chunks {
            out.push_str(&format!("[Source: {}] {}\n", chunk.source_id, chunk.text));
        }
        out
    }
}
