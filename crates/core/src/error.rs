//! Error types for the ragstream domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ragstream operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Decode errors ---
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    // --- Input validation ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Session state ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Collaborators ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the byte-stream transport. All of them are fatal for the turn
/// and none of them are retried.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Response has no readable body")]
    NoBody,

    #[error("Request failed: {message} (status: {status_code})")]
    Status { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

/// Fatal decode failures. Malformed individual lines are not errors; they are
/// skipped by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Stream line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },

    #[error("Stream completed without any assistant text")]
    EmptyResponse,

    #[error("Server reported an error mid-stream: {message}")]
    ServerError { message: String },
}

/// Input rejected before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No model selected")]
    MissingModel,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A turn is already in flight (state: {state})")]
    TurnInFlight { state: String },

    #[error("Turn cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Save rejected: {0}")]
    Rejected(String),
}
