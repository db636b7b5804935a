//! Transport trait — the abstraction over the streaming chat endpoint.
//!
//! A transport knows how to send an assembled message list and hand back the
//! raw response body as a stream of byte chunks. Decoding those bytes is the
//! pipeline's job, not the transport's.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::message::ConversationMessage;

/// Raw response body, chunk by chunk, as delivered by the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// The outbound request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "llama3.2", "mistral:7b")
    pub model: String,

    /// Messages in prompt order
    pub messages: Vec<ConversationMessage>,

    /// Always true for this pipeline
    pub stream: bool,

    /// Sampling options; absent when none were supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

impl ChatRequest {
    /// Build a streaming request. Empty option sets are dropped entirely.
    pub fn streaming(
        model: impl Into<String>,
        messages: Vec<ConversationMessage>,
        options: Option<ChatOptions>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            options: options.filter(|o| !o.is_empty()),
        }
    }
}

/// Model sampling options. Only explicitly provided fields are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl ChatOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.repeat_penalty.is_none()
            && self.seed.is_none()
            && self.num_ctx.is_none()
    }
}

/// The core transport trait.
///
/// `open_stream` resolves once response headers have arrived: a non-success
/// status or a missing body is reported here, before any bytes are decoded.
/// Failures are never retried by the pipeline.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// A human-readable name for this transport (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send the request and return the streaming response body.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;

    /// List models the endpoint can serve.
    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        Ok(Vec::new())
    }
}
