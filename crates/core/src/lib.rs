//! # ragstream Core
//!
//! Domain types, collaborator traits, and error definitions for the ragstream
//! chat pipeline. This crate has **no I/O of its own** — it defines the model
//! that the transport, storage and pipeline crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat transport, retrieval, persistence) is a
//! trait here. Implementations live in their respective crates, which keeps
//! the pipeline testable with scripted stand-ins and keeps the dependency
//! graph pointing inward.

pub mod error;
pub mod message;
pub mod persistence;
pub mod retrieval;
pub mod stream;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{
    DecodeError, Error, PersistenceError, Result, RetrievalError, SessionError, TransportError,
    ValidationError,
};
pub use message::{ConversationId, ConversationMessage, Role, Turn};
pub use persistence::{PersistenceGateway, TurnAck};
pub use retrieval::{RetrievalService, RetrievedChunk};
pub use stream::{CompletionMetrics, StreamEvent};
pub use transport::{ByteStream, ChatOptions, ChatRequest, ChatTransport};
