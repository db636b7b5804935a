//! Prompt-side planning: token estimation, retrieval budget, assembly.
//!
//! | Step | Type | Output |
//! |------|------|--------|
//! | 1. Estimate | [`TokenEstimator`] | token cost of each text |
//! | 2. Budget | [`ContextBudgeter`] | [`BudgetPlan`] chunk ceiling |
//! | 3. Assemble | [`ConversationAssembler`] | ordered message list |
//!
//! All three run once, synchronously, before a stream is opened, and are
//! not re-entered while it is being read.

pub mod assembler;
pub mod budget;
pub mod token;

pub use assembler::ConversationAssembler;
pub use budget::{BudgetPlan, BudgetPolicy, ContextBudgeter, MAX_CHUNKS, MIN_CHUNKS};
pub use token::{CharHeuristicEstimator, TokenEstimator};
