//! `ragstream plan` — show the retrieval budget for a message.

use std::sync::Arc;

use ragstream_memory::FileTurnStore;
use ragstream_pipeline::{CharHeuristicEstimator, ContextBudgeter, SessionConfig, TokenEstimator};

pub async fn run(message: &str, conversation: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let session_config = SessionConfig::from_app_config(&config);

    let store = FileTurnStore::new(config.storage.turns_dir.clone());
    let (_, history) = super::resume(&store, conversation).await?;

    let estimator = Arc::new(CharHeuristicEstimator::default());
    let budgeter = ContextBudgeter::new(session_config.budget, estimator.clone());
    let plan = budgeter.plan(
        session_config.context_window,
        &session_config.system_prompt,
        &history,
        message,
    );

    let report = serde_json::json!({
        "context_window": session_config.context_window,
        "reserve_fraction": session_config.budget.reserve_fraction,
        "system_prompt_tokens": estimator.estimate(&session_config.system_prompt),
        "conversation_tokens": estimator.estimate_messages(&history),
        "new_message_tokens": estimator.estimate(message),
        "available_token_budget": plan.available_token_budget,
        "max_chunks": plan.max_chunks,
        "overcommitted": plan.is_overcommitted(session_config.budget.avg_tokens_per_chunk),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
