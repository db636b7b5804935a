//! Retrieval budget planning.
//!
//! Decides, before a request is sent, how many retrieved chunks may be packed
//! into the prompt:
//!
//! ```text
//! available  = window * reserve_fraction - system - conversation - new_message
//! max_chunks = clamp(floor(available / avg_tokens_per_chunk), MIN_CHUNKS, MAX_CHUNKS)
//! ```
//!
//! The floor of `MIN_CHUNKS` applies even when `available` is zero or
//! negative, so a plan can itself overflow the window when the history is
//! already too long. Callers that cannot tolerate that must check
//! [`BudgetPlan::is_overcommitted`].

use std::sync::Arc;

use ragstream_core::message::ConversationMessage;
use serde::{Deserialize, Serialize};

use super::token::{CharHeuristicEstimator, TokenEstimator};

/// Fewest chunks a plan ever allows.
pub const MIN_CHUNKS: usize = 3;

/// Most chunks a plan ever allows.
pub const MAX_CHUNKS: usize = 10;

/// Tunables for the budget arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    /// Share of the window the prompt may use; the rest is left for the
    /// model's output and a safety margin. Must be in (0, 1].
    pub reserve_fraction: f64,

    /// Assumed size of one retrieved chunk, in tokens. Must be > 0.
    pub avg_tokens_per_chunk: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            reserve_fraction: 0.7,
            avg_tokens_per_chunk: 500,
        }
    }
}

/// The computed allowance of retrieved chunks for one turn. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetPlan {
    pub max_chunks: usize,
    pub available_token_budget: f64,
}

impl BudgetPlan {
    /// True when even `max_chunks` average-sized chunks do not fit in the
    /// available budget (only possible through the `MIN_CHUNKS` floor).
    pub fn is_overcommitted(&self, avg_tokens_per_chunk: usize) -> bool {
        (self.max_chunks * avg_tokens_per_chunk) as f64 > self.available_token_budget
    }
}

/// Pure budget calculator. No I/O, no state beyond its configuration.
#[derive(Clone)]
pub struct ContextBudgeter {
    policy: BudgetPolicy,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextBudgeter {
    pub fn new(policy: BudgetPolicy, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { policy, estimator }
    }

    /// Default policy with the character heuristic.
    pub fn with_defaults() -> Self {
        Self::new(
            BudgetPolicy::default(),
            Arc::new(CharHeuristicEstimator::default()),
        )
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Plan a turn, estimating every text with the configured estimator.
    pub fn plan(
        &self,
        max_window_tokens: usize,
        system_prompt: &str,
        history: &[ConversationMessage],
        new_user_message: &str,
    ) -> BudgetPlan {
        let system_tokens = self.estimator.estimate(system_prompt);
        let conversation_tokens = self.estimator.estimate_messages(history);
        let new_message_tokens = self.estimator.estimate(new_user_message);

        self.plan_from_costs(
            max_window_tokens,
            system_tokens,
            conversation_tokens,
            new_message_tokens,
        )
    }

    /// Plan from already-estimated token costs.
    pub fn plan_from_costs(
        &self,
        max_window_tokens: usize,
        system_tokens: usize,
        conversation_tokens: usize,
        new_message_tokens: usize,
    ) -> BudgetPlan {
        let reserved = max_window_tokens as f64 * self.policy.reserve_fraction;
        let used = (system_tokens + conversation_tokens + new_message_tokens) as f64;
        let available_token_budget = reserved - used;

        let per_chunk = self.policy.avg_tokens_per_chunk.max(1) as f64;
        let fitted = (available_token_budget / per_chunk).floor();
        let max_chunks = fitted.clamp(MIN_CHUNKS as f64, MAX_CHUNKS as f64) as usize;

        BudgetPlan {
            max_chunks,
            available_token_budget,
        }
    }
}

impl std::fmt::Debug for ContextBudgeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBudgeter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
