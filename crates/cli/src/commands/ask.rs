//! `ragstream ask` — stream one turn to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ragstream_core::retrieval::RetrievalService;
use ragstream_memory::{FileTurnStore, InMemoryRetrieval, NoopRetrieval};
use ragstream_pipeline::{ChatSession, RenderEvent, SessionConfig};
use ragstream_providers::OllamaTransport;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct AskArgs {
    pub message: String,
    pub model: Option<String>,
    pub conversation: Option<String>,
    pub context: Vec<PathBuf>,
}

pub async fn run(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    let mut session_config = SessionConfig::from_app_config(&config);
    if let Some(model) = args.model {
        session_config = session_config.with_model(model);
    }

    let transport = Arc::new(OllamaTransport::from_config(&config)?);
    let store = Arc::new(FileTurnStore::new(config.storage.turns_dir.clone()));
    let (conversation_id, history) = super::resume(&store, args.conversation).await?;
    let retrieval = load_context(&args.context).await?;

    let session = ChatSession::new(session_config, transport, retrieval, store)
        .with_conversation_id(conversation_id.clone())
        .with_history(history);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_events(rx, std::io::stdout()));

    let result = session.submit(&args.message, Some(&tx), &cancel).await;
    drop(tx);
    ctrl_c.abort();
    if let Err(e) = printer.await? {
        debug!(error = %e, "Response was not fully printed");
    }

    let outcome = result?;
    let rate = outcome
        .metrics
        .as_ref()
        .and_then(|m| m.tokens_per_second())
        .map(|tps| format!("{tps:.1} tok/s"))
        .unwrap_or_else(|| "n/a".into());
    info!(
        conversation = %conversation_id,
        chunks = outcome.chunks_used,
        max_chunks = outcome.plan.max_chunks,
        rate = %rate,
        "Done"
    );
    eprintln!("conversation: {conversation_id}");
    Ok(())
}

/// Split each file into blank-line separated passages for keyword retrieval.
async fn load_context(
    paths: &[PathBuf],
) -> Result<Arc<dyn RetrievalService>, Box<dyn std::error::Error>> {
    if paths.is_empty() {
        return Ok(Arc::new(NoopRetrieval));
    }

    let retrieval = InMemoryRetrieval::new();
    for path in paths {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        for passage in passages(&content) {
            retrieval.add(passage, source.clone()).await;
        }
    }
    debug!(passages = retrieval.len().await, "Loaded reference context");
    Ok(Arc::new(retrieval))
}

fn passages(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Print stable text as it arrives. After the first write failure, such as a
/// closed pipe, the remaining events are drained unprinted and the error is
/// returned.
async fn print_events(
    mut rx: mpsc::Receiver<RenderEvent>,
    mut out: impl Write,
) -> std::io::Result<()> {
    let mut printer = StablePrinter::default();
    let mut failure = None;

    while let Some(event) = rx.recv().await {
        if let RenderEvent::Error { message } = &event {
            eprintln!("\n[error] {message}");
            continue;
        }
        if failure.is_some() {
            continue;
        }
        if let Err(e) = printer.write(&mut out, &event) {
            debug!(error = %e, "Output closed; no longer printing");
            failure = Some(e);
        }
    }
    failure.map_or(Ok(()), Err)
}

/// Prints only text that later events cannot revise.
#[derive(Debug, Default)]
struct StablePrinter {
    printed: usize,
}

impl StablePrinter {
    fn advance(&mut self, event: &RenderEvent) -> Option<String> {
        let stable = event.stable_text()?;
        let delta = stable.get(self.printed..).filter(|d| !d.is_empty())?;
        self.printed = stable.len();
        Some(delta.to_string())
    }

    fn write(&mut self, out: &mut impl Write, event: &RenderEvent) -> std::io::Result<()> {
        if let Some(delta) = self.advance(event) {
            write!(out, "{delta}")?;
            out.flush()?;
        }
        if matches!(event, RenderEvent::Done { .. }) {
            writeln!(out)?;
        }
        Ok(())
    }
}
