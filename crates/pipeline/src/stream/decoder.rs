//! Streaming NDJSON decoder.
//!
//! Bytes from the transport are reassembled into lines, each line is parsed
//! into a [`StreamEvent`], and event text is pushed through the
//! [`WordBoundaryBuffer`]. The decoder can be driven synchronously with
//! [`StreamDecoder::feed`] / [`StreamDecoder::finish`], or asynchronously
//! over a [`ByteStream`] with [`StreamDecoder::run`].
//!
//! Malformed lines are skipped. Lines after the final event are ignored, so
//! the buffer is flushed exactly once.

use std::sync::Arc;

use futures::StreamExt;
use ragstream_core::error::{DecodeError, Error, SessionError};
use ragstream_core::stream::{CompletionMetrics, StreamEvent};
use ragstream_core::transport::ByteStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::buffer::WordBoundaryBuffer;
use super::event::RenderEvent;
use super::transform::TextTransformer;
use super::wire::{self, WireLine};

/// Longest line the decoder buffers before giving up.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Result of a stream decoded to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub text: String,
    pub metrics: Option<CompletionMetrics>,
}

#[derive(Debug)]
pub struct StreamDecoder {
    buffer: WordBoundaryBuffer,
    line_buf: Vec<u8>,
    max_line_bytes: usize,
    finished: bool,
    metrics: Option<CompletionMetrics>,
    events_decoded: usize,
    lines_skipped: usize,
}

impl StreamDecoder {
    pub fn new(transformer: Arc<dyn TextTransformer>) -> Self {
        Self {
            buffer: WordBoundaryBuffer::new(transformer),
            line_buf: Vec::new(),
            max_line_bytes: MAX_LINE_BYTES,
            finished: false,
            metrics: None,
            events_decoded: 0,
            lines_skipped: 0,
        }
    }

    pub fn with_max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line_bytes = limit.max(1);
        self
    }

    /// Feed raw bytes, appending the render events produced by every
    /// complete line in the chunk to `out`.
    ///
    /// On a fatal line, events decoded before it in the same chunk are
    /// already in `out` when the error is returned.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<RenderEvent>) -> Result<(), DecodeError> {
        if self.finished {
            return Ok(());
        }

        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.extend_line(&rest[..pos])?;
            rest = &rest[pos + 1..];

            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&line, out)?;
            if self.finished {
                if rest.iter().any(|b| !b.is_ascii_whitespace()) {
                    debug!(bytes = rest.len(), "Ignoring data after final stream event");
                }
                return Ok(());
            }
        }
        self.extend_line(rest)
    }

    /// Signal end of input: decode any unterminated last line, then flush
    /// if no final event was seen.
    pub fn finish(&mut self, out: &mut Vec<RenderEvent>) -> Result<(), DecodeError> {
        if self.finished {
            return Ok(());
        }

        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&line, out)?;
        }
        if !self.finished {
            debug!(
                events = self.events_decoded,
                "Stream ended without a final event"
            );
            out.push(self.complete());
        }
        Ok(())
    }

    /// Drive the decoder over a byte stream until it completes, fails, or
    /// `cancel` fires.
    ///
    /// Every render event is sent on `events` if given; a closed receiver
    /// does not stop decoding, and a full one never outlasts `cancel`. On
    /// error the events decoded before the failure are published ahead of
    /// the error event, and the partial text stays readable via
    /// [`StreamDecoder::render`]. On cancellation the pending tail is
    /// discarded unflushed.
    pub async fn run(
        &mut self,
        mut stream: ByteStream,
        events: Option<&mpsc::Sender<RenderEvent>>,
        cancel: &CancellationToken,
    ) -> Result<DecodedResponse, Error> {
        let mut publisher = Publisher::new(events, cancel);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                next = stream.next() => next,
            };

            let mut produced = Vec::new();
            let outcome = match next {
                Some(Ok(bytes)) => self.feed(&bytes, &mut produced),
                Some(Err(e)) => {
                    warn!(error = %e, "Stream read failed");
                    publisher.send_error(&e).await;
                    return Err(e.into());
                }
                None => self.finish(&mut produced),
            };

            for event in produced {
                if publisher.send(event).await.is_err() {
                    return Err(self.cancelled());
                }
            }
            if let Err(e) = outcome {
                warn!(error = %e, "Stream decode failed");
                publisher.send_error(&e).await;
                return Err(e.into());
            }
            if self.finished {
                break;
            }
        }

        debug!(
            events = self.events_decoded,
            skipped = self.lines_skipped,
            chars = self.buffer.committed_text().chars().count(),
            "Stream decoded"
        );

        Ok(DecodedResponse {
            text: self.buffer.committed_text().to_string(),
            metrics: self.metrics.clone(),
        })
    }

    /// Current render string: committed text plus the provisional tail.
    pub fn render(&self) -> String {
        self.buffer.render()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn metrics(&self) -> Option<&CompletionMetrics> {
        self.metrics.as_ref()
    }

    pub fn lines_skipped(&self) -> usize {
        self.lines_skipped
    }

    fn extend_line(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        if self.line_buf.len() + bytes.len() > self.max_line_bytes {
            return Err(DecodeError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        self.line_buf.extend_from_slice(bytes);
        Ok(())
    }

    fn handle_line(&mut self, raw: &[u8], out: &mut Vec<RenderEvent>) -> Result<(), DecodeError> {
        let Ok(text) = std::str::from_utf8(raw) else {
            self.skip("invalid utf-8");
            return Ok(());
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        match wire::parse_line(text) {
            Some(WireLine::Event(event)) => {
                self.apply(event, out);
                Ok(())
            }
            Some(WireLine::ServerError(message)) => Err(DecodeError::ServerError { message }),
            None => {
                self.skip(text);
                Ok(())
            }
        }
    }

    fn apply(&mut self, event: StreamEvent, out: &mut Vec<RenderEvent>) {
        self.events_decoded += 1;
        let has_text = !event.delta_text.is_empty();
        if has_text {
            self.buffer.push(&event.delta_text);
        }

        if event.is_final {
            self.metrics = event.metrics;
            out.push(self.complete());
        } else if has_text {
            out.push(RenderEvent::Chunk {
                text: self.buffer.render(),
                committed: self.buffer.committed_text().len(),
            });
        }
    }

    fn complete(&mut self) -> RenderEvent {
        self.buffer.flush();
        self.finished = true;
        RenderEvent::Done {
            text: self.buffer.committed_text().to_string(),
            metrics: self.metrics.clone(),
        }
    }

    fn cancelled(&mut self) -> Error {
        let dropped = self.buffer.discard();
        debug!(dropped_bytes = dropped, "Stream cancelled; pending tail discarded");
        SessionError::Cancelled.into()
    }

    fn skip(&mut self, line: &str) {
        self.lines_skipped += 1;
        let preview: String = line.chars().take(80).collect();
        trace!(line = %preview, "Skipping malformed stream line");
    }
}

/// Sends render events, tolerating a receiver that has gone away. A send
/// blocked on a full channel gives up when `cancel` fires.
struct Publisher<'a> {
    tx: Option<&'a mpsc::Sender<RenderEvent>>,
    cancel: &'a CancellationToken,
}

impl<'a> Publisher<'a> {
    fn new(tx: Option<&'a mpsc::Sender<RenderEvent>>, cancel: &'a CancellationToken) -> Self {
        Self { tx, cancel }
    }

    async fn send(&mut self, event: RenderEvent) -> Result<(), SessionError> {
        let Some(tx) = self.tx else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            sent = tx.send(event) => {
                if sent.is_err() {
                    trace!("Render receiver closed; continuing without it");
                    self.tx = None;
                }
                Ok(())
            }
        }
    }

    /// Best-effort terminal error event; the caller returns `error` either way.
    async fn send_error(&mut self, error: &impl std::fmt::Display) {
        let event = RenderEvent::Error {
            message: error.to_string(),
        };
        if self.send(event).await.is_err() {
            debug!("Cancelled while publishing stream error");
        }
    }
}
