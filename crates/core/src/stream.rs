//! Decoded stream events.
//!
//! A `StreamEvent` is one protocol unit of the streaming response, produced
//! one per NDJSON line. `CompletionMetrics` is what the final event reports.

use serde::{Deserialize, Serialize};

/// One decoded protocol unit. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Text appended by this event (may be empty)
    pub delta_text: String,

    /// Whether this is the terminal event of the stream
    pub is_final: bool,

    /// Metrics reported by the terminal event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CompletionMetrics>,
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta_text: text.into(),
            is_final: false,
            metrics: None,
        }
    }

    pub fn final_event(text: impl Into<String>, metrics: CompletionMetrics) -> Self {
        Self {
            delta_text: text.into(),
            is_final: true,
            metrics: Some(metrics),
        }
    }
}

/// Timing and token counts reported when generation completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
}

impl CompletionMetrics {
    /// Generated tokens per second, when both count and duration are known.
    pub fn tokens_per_second(&self) -> Option<f64> {
        match (self.eval_count, self.eval_duration_ms) {
            (Some(count), Some(ms)) if ms > 0 => Some(count as f64 * 1000.0 / ms as f64),
            _ => None,
        }
    }
}
