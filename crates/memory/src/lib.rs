//! Retrieval and turn storage backends for ragstream.

pub mod file_store;
pub mod in_memory;
pub mod noop;

use chrono::{DateTime, Utc};
use ragstream_core::message::{ConversationId, ConversationMessage};
use serde::{Deserialize, Serialize};

pub use file_store::FileTurnStore;
pub use in_memory::{InMemoryRetrieval, InMemoryTurnStore};
pub use noop::NoopRetrieval;

/// A turn as recorded by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTurn {
    pub turn_id: String,
    pub conversation_id: ConversationId,
    pub user_message: String,
    pub assistant_message: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredTurn {
    pub fn to_messages(&self) -> [ConversationMessage; 2] {
        [
            ConversationMessage::user(&self.user_message),
            ConversationMessage::assistant(&self.assistant_message),
        ]
    }
}

/// Flatten stored turns into prompt-order history.
pub fn history_from(turns: &[StoredTurn]) -> Vec<ConversationMessage> {
    turns.iter().flat_map(StoredTurn::to_messages).collect()
}
