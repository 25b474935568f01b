//! Per-request run driver shared by generate and stream.
//!
//! Reads stdout to EOF before waiting on the child, so every line the CLI
//! wrote has been handled by the time the request is concluded.

use std::process::ExitStatus;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::cli::{CodexEvent, CodexProcess, EventReader, TokenUsage, DEFAULT_TERMINATE_TIMEOUT};

use super::tools::{ItemPhase, ToolTracker};
use super::{AbortSignal, ProviderError, ResponseMetadata, StreamPart};

/// Reason used when a stream's consumer goes away mid-run.
pub(crate) const CONSUMER_GONE_REASON: &str = "Stream consumer dropped";

/// Log a request lifecycle step at `info` when verbose, else `debug`.
pub(crate) fn lifecycle(verbose: bool, model_id: &str, stage: &str) {
    if verbose {
        tracing::info!(model_id, stage, "Codex request");
    } else {
        tracing::debug!(model_id, stage, "Codex request");
    }
}

/// Mutable state of one request.
#[derive(Debug)]
pub(crate) struct RequestState {
    model_id: String,
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub session_id: Option<String>,
    pub failure: Option<String>,
    metadata_emitted: bool,
    tools: ToolTracker,
}

impl RequestState {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            text: None,
            usage: None,
            session_id: None,
            failure: None,
            metadata_emitted: false,
            tools: ToolTracker::new(),
        }
    }

    /// Apply one event and return the parts it makes determinable.
    pub fn handle_event(&mut self, event: &CodexEvent) -> Vec<StreamPart> {
        let mut parts = Vec::new();

        if let Some(session_id) = event.session_id() {
            self.session_id = Some(session_id.to_string());
            if !self.metadata_emitted {
                self.metadata_emitted = true;
                parts.push(StreamPart::ResponseMetadata(ResponseMetadata {
                    id: session_id.to_string(),
                    timestamp: Utc::now(),
                    model_id: self.model_id.clone(),
                }));
            }
        }

        if let Some(message) = event.failure_message() {
            tracing::debug!(message = %message, "Codex reported failure");
            self.failure = Some(message);
        }

        match event {
            CodexEvent::TurnCompleted { usage: Some(usage) } => self.usage = Some(*usage),
            CodexEvent::ItemStarted { item } => {
                parts.extend(self.tools.on_item(ItemPhase::Started, item));
            }
            CodexEvent::ItemUpdated { item } => {
                parts.extend(self.tools.on_item(ItemPhase::Updated, item));
            }
            CodexEvent::ItemCompleted { item } => {
                if let Some(text) = item.assistant_text().filter(|t| !t.is_empty()) {
                    self.text = Some(text.to_string());
                }
                parts.extend(self.tools.on_item(ItemPhase::Completed, item));
            }
            _ => {}
        }
        parts
    }
}

/// Destination for parts produced while the process runs.
#[async_trait]
pub(crate) trait PartSink: Send + Sync {
    async fn emit(&mut self, part: StreamPart);

    /// Whether nobody is listening anymore.
    fn is_closed(&self) -> bool {
        false
    }

    /// Resolves once nobody is listening. Never resolves by default.
    async fn closed(&self) {
        std::future::pending::<()>().await;
    }
}

#[async_trait]
impl PartSink for Vec<StreamPart> {
    async fn emit(&mut self, part: StreamPart) {
        self.push(part);
    }
}

/// Forwards parts to a stream consumer, tolerating a dropped receiver.
pub(crate) struct ChannelSink {
    tx: mpsc::Sender<Result<StreamPart, ProviderError>>,
    closed: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<StreamPart, ProviderError>>) -> Self {
        Self { tx, closed: false }
    }

    /// Send a terminal error, if anyone is still listening.
    pub async fn fail(&mut self, err: ProviderError) {
        if self.closed {
            tracing::debug!(error = %err, "Dropping error for closed stream");
            return;
        }
        if self.tx.send(Err(err)).await.is_err() {
            self.closed = true;
        }
    }
}

#[async_trait]
impl PartSink for ChannelSink {
    async fn emit(&mut self, part: StreamPart) {
        if self.closed {
            return;
        }
        if self.tx.send(Ok(part)).await.is_err() {
            tracing::debug!("Stream receiver dropped");
            self.closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed || self.tx.is_closed()
    }

    async fn closed(&self) {
        if !self.closed {
            self.tx.closed().await;
        }
    }
}

/// How the process ended.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub status: ExitStatus,
    pub stderr: String,
    /// Set when the run was cut short by an abort or a dropped consumer.
    pub cancelled: Option<String>,
}

enum Step {
    Event(std::io::Result<Option<CodexEvent>>),
    Abort,
    ConsumerGone,
    KillDeadline,
}

/// Drive `process` to completion, feeding every stdout event through
/// `state` into `sink`.
///
/// An abort after spawn sends SIGTERM and keeps draining; the process is
/// killed if it is still alive after [`DEFAULT_TERMINATE_TIMEOUT`].
///
/// # Errors
///
/// Returns an error if stdout was not captured or waiting on the child fails.
pub(crate) async fn drive<S: PartSink>(
    process: &mut CodexProcess,
    state: &mut RequestState,
    sink: &mut S,
    abort: Option<&AbortSignal>,
) -> Result<RunOutcome, ProviderError> {
    let stdout = process
        .take_stdout()
        .ok_or_else(|| std::io::Error::other("codex stdout was not captured"))?;

    let stderr_task = process.take_stderr().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::debug!(error = %e, "Failed to read codex stderr");
            }
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let mut reader = EventReader::new(stdout);
    let mut cancelled: Option<String> = None;
    let mut kill_at: Option<Instant> = None;

    loop {
        let step = if let Some(deadline) = kill_at {
            tokio::select! {
                event = reader.next_event() => Step::Event(event),
                () = tokio::time::sleep_until(deadline) => Step::KillDeadline,
            }
        } else {
            let aborted = async {
                match abort {
                    Some(signal) => signal.aborted().await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                () = aborted => Step::Abort,
                () = sink.closed() => Step::ConsumerGone,
                event = reader.next_event() => Step::Event(event),
            }
        };

        match step {
            Step::Abort => {
                let reason = abort.map_or_else(String::new, AbortSignal::reason);
                tracing::debug!(pid = ?process.id(), reason = %reason, "Abort requested, terminating codex");
                process.request_termination();
                cancelled = Some(reason);
                kill_at = Some(Instant::now() + DEFAULT_TERMINATE_TIMEOUT);
            }
            Step::ConsumerGone => {
                tracing::debug!(pid = ?process.id(), "Stream consumer gone, terminating codex");
                process.request_termination();
                cancelled = Some(CONSUMER_GONE_REASON.to_string());
                kill_at = Some(Instant::now() + DEFAULT_TERMINATE_TIMEOUT);
            }
            Step::KillDeadline => {
                tracing::warn!(pid = ?process.id(), "Codex ignored SIGTERM, killing");
                process.start_kill();
                break;
            }
            Step::Event(Ok(Some(event))) => {
                for part in state.handle_event(&event) {
                    sink.emit(part).await;
                }
                if kill_at.is_none() && sink.is_closed() {
                    process.request_termination();
                    cancelled = Some(CONSUMER_GONE_REASON.to_string());
                    kill_at = Some(Instant::now() + DEFAULT_TERMINATE_TIMEOUT);
                }
            }
            Step::Event(Ok(None)) => break,
            Step::Event(Err(e)) => {
                tracing::warn!(error = %e, "Failed reading codex stdout");
                break;
            }
        }
    }

    if reader.skipped() > 0 {
        tracing::debug!(skipped = reader.skipped(), "Ignored non-JSON stdout lines");
    }

    let status = if cancelled.is_some() {
        process.wait_or_kill(DEFAULT_TERMINATE_TIMEOUT).await?
    } else {
        process.wait().await?
    };

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    tracing::debug!(code = ?status.code(), stderr_bytes = stderr.len(), "Codex exited");

    Ok(RunOutcome {
        status,
        stderr,
        cancelled,
    })
}

/// Map a finished run onto success or a classified error.
///
/// Precedence: abort, then an in-stream failure (even on exit 0), then a
/// nonzero exit.
///
/// # Errors
///
/// Returns [`ProviderError::Aborted`] or [`ProviderError::ApiCall`].
pub(crate) fn conclude(
    state: &RequestState,
    outcome: &RunOutcome,
    prompt: &str,
) -> Result<(), ProviderError> {
    if let Some(reason) = &outcome.cancelled {
        return Err(ProviderError::Aborted {
            reason: reason.clone(),
        });
    }

    let exit_code = outcome.status.code();
    if let Some(failure) = &state.failure {
        return Err(ProviderError::api_call(
            failure.clone(),
            exit_code,
            outcome.stderr.clone(),
            prompt,
        ));
    }

    if !outcome.status.success() {
        let message = match exit_code {
            Some(code) => format!("Codex CLI exited with code {code}"),
            None => "Codex CLI was terminated by a signal".to_string(),
        };
        return Err(ProviderError::api_call(
            message,
            exit_code,
            outcome.stderr.clone(),
            prompt,
        ));
    }
    Ok(())
}
