//! NDJSON line parsing for the chat streaming body.
//!
//! ```text
//! {"message":{"role":"assistant","content":"Hel"},"done":false}
//! {"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop",
//!  "total_duration":5589157167,"eval_count":290,"eval_duration":4709213000}
//! ```
//!
//! Durations arrive in nanoseconds and are converted to milliseconds.

use ragstream_core::stream::{CompletionMetrics, StreamEvent};
use serde::Deserialize;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// A successfully parsed line.
#[derive(Debug, Clone, PartialEq)]
pub enum WireLine {
    Event(StreamEvent),

    /// `{"error": "..."}` sent by the server in place of an event.
    ServerError(String),
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: String,
}

/// Parse one non-blank line. `None` means the line is malformed: not JSON,
/// or JSON without a `done` flag.
pub fn parse_line(line: &str) -> Option<WireLine> {
    let raw: RawLine = serde_json::from_str(line).ok()?;

    if let Some(error) = raw.error {
        return Some(WireLine::ServerError(error));
    }

    let is_final = raw.done?;
    let delta_text = raw.message.map(|m| m.content).unwrap_or_default();

    let metrics = is_final.then(|| CompletionMetrics {
        total_duration_ms: raw.total_duration.map(nanos_to_millis),
        load_duration_ms: raw.load_duration.map(nanos_to_millis),
        prompt_eval_count: raw.prompt_eval_count,
        eval_count: raw.eval_count,
        eval_duration_ms: raw.eval_duration.map(nanos_to_millis),
        done_reason: raw.done_reason,
    });

    Some(WireLine::Event(StreamEvent {
        delta_text,
        is_final,
        metrics,
    }))
}

fn nanos_to_millis(ns: u64) -> u64 {
    ns / NANOS_PER_MILLI
}
