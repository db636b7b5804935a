//! The ragstream chat pipeline.
//!
//! Before a request is sent, the **context** side decides how much retrieved
//! material fits and assembles the prompt:
//!
//! 1. **Estimate** token costs with a [`TokenEstimator`]
//! 2. **Budget** a chunk ceiling with [`ContextBudgeter`]
//! 3. **Retrieve** at most that many chunks and **assemble** the message list
//!    with [`ConversationAssembler`]
//!
//! While the reply streams, the **stream** side turns bytes into word-safe
//! render text:
//!
//! 4. **Decode** NDJSON lines with [`StreamDecoder`]
//! 5. **Buffer** text to the last safe boundary with [`WordBoundaryBuffer`]
//! 6. **Transform** committed text exactly once with a [`TextTransformer`]
//!
//! [`ChatSession`] drives both sides for one conversation and hands each
//! finished turn to the persistence gateway exactly once.

pub mod context;
pub mod session;
pub mod stream;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    BudgetPlan, BudgetPolicy, CharHeuristicEstimator, ContextBudgeter, ConversationAssembler,
    MAX_CHUNKS, MIN_CHUNKS, TokenEstimator,
};
pub use session::{ChatSession, SessionConfig, SessionState, TurnOutcome};
pub use stream::{
    DecodedResponse, Emission, IdentityTransformer, RenderEvent, SpellingNormalizer,
    StreamDecoder, TextTransformer, WordBoundaryBuffer,
};
pub use turn::{PendingSave, TurnTracker};
