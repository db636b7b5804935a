//! File-based turn store — persistent JSON-lines storage.
//!
//! One file per conversation, one JSON-encoded [`StoredTurn`] per line:
//! `<dir>/<conversation_id>.jsonl`. Saves append a single line, so a crash
//! can lose at most the turn being written. Default location:
//! `~/.ragstream/turns/`.

use async_trait::async_trait;
use chrono::Utc;
use ragstream_core::error::PersistenceError;
use ragstream_core::message::ConversationId;
use ragstream_core::persistence::{PersistenceGateway, TurnAck};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::StoredTurn;

/// A JSONL-backed turn store.
pub struct FileTurnStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTurnStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding a conversation's turns.
    pub fn path_for(&self, conversation_id: &ConversationId) -> PathBuf {
        let safe: String = conversation_id
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.jsonl"))
    }

    /// Load a conversation's turns, oldest first. Corrupted lines are skipped.
    pub async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<StoredTurn>, PersistenceError> {
        let path = self.path_for(conversation_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistenceError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<StoredTurn>(line) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Skipping corrupted turn record");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl PersistenceGateway for FileTurnStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save_turn(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<TurnAck, PersistenceError> {
        let turn = StoredTurn {
            turn_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            user_message: user_message.to_string(),
            assistant_message: assistant_message.to_string(),
            saved_at: Utc::now(),
        };

        let mut line = serde_json::to_string(&turn)
            .map_err(|e| PersistenceError::Storage(format!("Failed to serialize turn: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PersistenceError::Storage(format!("Failed to create turn directory: {e}"))
        })?;

        let path = self.path_for(conversation_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to open turn file: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to write turn file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to flush turn file: {e}")))?;

        debug!(path = %path.display(), turn_id = %turn.turn_id, "Turn saved");

        Ok(TurnAck {
            turn_id: turn.turn_id,
            saved_at: turn.saved_at,
        })
    }
}
