pub mod ask;
pub mod config_cmd;
pub mod models;
pub mod plan;

use ragstream_config::AppConfig;
use ragstream_core::message::{ConversationId, ConversationMessage};
use ragstream_memory::{FileTurnStore, history_from};

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Stored history for `conversation`, or a fresh conversation.
pub async fn resume(
    store: &FileTurnStore,
    conversation: Option<String>,
) -> Result<(ConversationId, Vec<ConversationMessage>), Box<dyn std::error::Error>> {
    let Some(id) = conversation else {
        return Ok((ConversationId::new(), Vec::new()));
    };
    let id = ConversationId(id);
    let turns = store.load(&id).await?;
    Ok((id, history_from(&turns)))
}
