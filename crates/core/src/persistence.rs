//! Persistence trait — durable storage of finished turns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::message::ConversationId;

/// Acknowledgement returned by a successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAck {
    /// Identifier assigned by the store
    pub turn_id: String,

    /// When the store accepted the turn
    pub saved_at: DateTime<Utc>,
}

impl TurnAck {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            saved_at: Utc::now(),
        }
    }
}

/// The PersistenceGateway trait.
///
/// Called at most once per completed turn by the pipeline. Server-side
/// deduplication, if any, is the implementation's concern.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// The store name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    async fn save_turn(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<TurnAck, PersistenceError>;
}
