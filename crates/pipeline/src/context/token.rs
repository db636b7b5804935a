//! Token estimation strategies.
//!
//! The budgeter never tokenizes for real. It asks a [`TokenEstimator`] for a
//! cheap, deterministic approximation and applies the same estimator to every
//! text it measures, so relative comparisons stay consistent even when the
//! absolute counts are off. A real tokenizer can be dropped in by
//! implementing the trait.

use ragstream_core::message::ConversationMessage;

/// Estimate token counts for text.
///
/// Implementations must be deterministic and monotonic: appending text never
/// lowers the estimate.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Sum of the estimates of each message's content.
    fn estimate_messages(&self, messages: &[ConversationMessage]) -> usize {
        messages.iter().map(|m| self.estimate(&m.content)).sum()
    }
}

/// Character-count heuristic: ~4 characters per token, rounded up.
///
/// Within ~10% of BPE tokenizers on English prose. Counts `char`s rather than
/// bytes so non-ASCII text is not over-charged.
#[derive(Debug, Clone, Copy)]
pub struct CharHeuristicEstimator {
    chars_per_token: usize,
}

impl CharHeuristicEstimator {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    /// `chars_per_token` of zero is treated as one.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharHeuristicEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}
