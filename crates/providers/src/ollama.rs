//! Ollama-style NDJSON chat transport.
//!
//! Works with any endpoint exposing `POST /api/chat` that streams one JSON
//! object per line (Ollama and its compatible servers).
//!
//! Supports:
//! - Streaming chat requests (body handed back as raw byte chunks)
//! - Model listing via `GET /api/tags`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ragstream_config::AppConfig;
use ragstream_core::error::TransportError;
use ragstream_core::transport::{ByteStream, ChatRequest, ChatTransport};
use serde::Deserialize;
use tracing::{debug, warn};

/// A streaming chat transport for Ollama-compatible endpoints.
pub struct OllamaTransport {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaTransport {
    /// Create a transport for `base_url` with the given timeouts.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "ollama".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a transport from the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.endpoint,
            Duration::from_secs(config.request.timeout_secs),
            Duration::from_secs(config.request.connect_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

/// Map a request-phase failure to the transport taxonomy.
fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Map a failure while reading the body.
fn body_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::StreamInterrupted(e.to_string())
    }
}

#[async_trait]
impl ChatTransport for OllamaTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        debug!(
            transport = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming chat request"
        );

        let response = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = error_message(&error_body);
            warn!(status = status.as_u16(), body = %error_body, "Chat endpoint returned error");
            return Err(TransportError::Status {
                status_code: status.as_u16(),
                message,
            });
        }

        if response.content_length() == Some(0) {
            return Err(TransportError::NoBody);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(body_error));

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .client
            .get(self.tags_url())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status_code: status.as_u16(),
                message: error_message(&error_body),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| TransportError::StreamInterrupted(format!("Failed to parse tags: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Prefer the `error` field of a JSON error body, fall back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => "empty error body".into(),
        Err(_) => body.trim().to_string(),
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}
