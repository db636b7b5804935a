//! Render events published while a turn streams.
//!
//! Consumers (a terminal printer, a UI) receive these over an mpsc channel:
//! - `chunk` — the full render string after an event; the first `committed`
//!   bytes are final, the rest is the raw provisional tail
//! - `done`  — the final text, sent exactly once per successful stream
//! - `error` — the turn failed; text already rendered stays valid

use ragstream_core::stream::CompletionMetrics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    Chunk {
        text: String,
        committed: usize,
    },

    Done {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<CompletionMetrics>,
    },

    Error {
        message: String,
    },
}

impl RenderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    /// Text that will not change in later events.
    pub fn stable_text(&self) -> Option<&str> {
        match self {
            Self::Chunk { text, committed } => text.get(..*committed),
            Self::Done { text, .. } => Some(text),
            Self::Error { .. } => None,
        }
    }

    /// The render string carried by the event, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Chunk { text, .. } | Self::Done { text, .. } => Some(text),
            Self::Error { .. } => None,
        }
    }
}
