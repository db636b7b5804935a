//! Chat transport implementations for ragstream.
//!
//! All transports implement the `ragstream_core::ChatTransport` trait and
//! hand the response body back undecoded.

pub mod ollama;

pub use ollama::OllamaTransport;
