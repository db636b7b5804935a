//! Turn completion tracking.
//!
//! Completion may be signalled more than once for the same turn (a consumer
//! re-subscribing, a retry of the notification path). The tracker hands out
//! a save request at most once per `(conversation, user message)` pairing
//! and only after decoding has finished with non-empty text.

use ragstream_core::message::ConversationId;

/// A finished turn ready to be handed to the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub conversation_id: ConversationId,
    pub user_message: String,
    pub assistant_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveTurn {
    conversation_id: ConversationId,
    user_message: String,
    response: Option<String>,
    submitted: bool,
}

/// Transient state for the turn currently in flight.
#[derive(Debug, Default)]
pub struct TurnTracker {
    active: Option<ActiveTurn>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a turn, replacing whatever was tracked before.
    pub fn begin(&mut self, conversation_id: ConversationId, user_message: impl Into<String>) {
        self.active = Some(ActiveTurn {
            conversation_id,
            user_message: user_message.into(),
            response: None,
            submitted: false,
        });
    }

    /// Record the fully decoded response. Partial text must never be passed
    /// here.
    pub fn record_response(&mut self, text: impl Into<String>) {
        if let Some(turn) = self.active.as_mut() {
            turn.response = Some(text.into());
        }
    }

    /// Handle a completion signal. Returns the save request the first time
    /// the turn is eligible and `None` on every later signal.
    pub fn on_completion(&mut self) -> Option<PendingSave> {
        let turn = self.active.as_mut()?;
        if turn.submitted {
            return None;
        }
        let response = turn.response.as_ref().filter(|r| !r.trim().is_empty())?;

        turn.submitted = true;
        Some(PendingSave {
            conversation_id: turn.conversation_id.clone(),
            user_message: turn.user_message.clone(),
            assistant_message: response.clone(),
        })
    }

    /// The save was acknowledged; clear all transient state.
    pub fn acknowledge(&mut self) {
        self.active = None;
    }

    /// Drop the turn without saving (cancellation, failure).
    pub fn abandon(&mut self) {
        self.active = None;
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_submitted(&self) -> bool {
        self.active.as_ref().is_some_and(|t| t.submitted)
    }
}
