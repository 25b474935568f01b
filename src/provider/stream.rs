//! Streaming generation over a bounded channel.
//!
//! The CLI does not deliver token deltas in JSON mode, so the final text
//! arrives as a single `text-delta` just before `finish`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cli::{build_invocation, CodexProcess, Invocation};

use super::model::PreparedCall;
use super::runner::{conclude, drive, lifecycle, ChannelSink, PartSink, RequestState};
use super::{classify_spawn_error, AbortSignal, FinishReason, ProviderError, StreamPart, Usage};

/// Default buffer size for the part channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Parts of one streaming request, ending with `finish` or an error.
///
/// Dropping the stream early terminates the subprocess.
#[derive(Debug)]
pub struct StreamResponse {
    inner: ReceiverStream<Result<StreamPart, ProviderError>>,
}

impl StreamResponse {
    fn new(rx: mpsc::Receiver<Result<StreamPart, ProviderError>>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Drain the stream, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the error that terminated the stream.
    pub async fn into_parts(mut self) -> Result<Vec<StreamPart>, ProviderError> {
        let mut parts = Vec::new();
        while let Some(part) = self.next().await {
            parts.push(part?);
        }
        Ok(parts)
    }
}

impl Stream for StreamResponse {
    type Item = Result<StreamPart, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Start a streaming request.
///
/// # Errors
///
/// Returns [`ProviderError::Aborted`] without spawning if `abort` already
/// fired, or an I/O error if temp artifacts cannot be created. Later
/// failures arrive as the stream's final item.
pub(crate) fn stream(
    model_id: String,
    call: PreparedCall,
    abort: Option<AbortSignal>,
) -> Result<StreamResponse, ProviderError> {
    if let Some(signal) = abort.as_ref().filter(|s| s.is_aborted()) {
        lifecycle(call.settings.is_verbose(), &model_id, "aborted before spawn");
        return Err(ProviderError::Aborted {
            reason: signal.reason(),
        });
    }

    let invocation =
        build_invocation(&call.prompt, call.schema.as_ref(), &call.settings, &model_id)?;
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    tokio::spawn(run_stream(model_id, call, invocation, abort, ChannelSink::new(tx)));
    Ok(StreamResponse::new(rx))
}

async fn run_stream(
    model_id: String,
    call: PreparedCall,
    mut invocation: Invocation,
    abort: Option<AbortSignal>,
    mut sink: ChannelSink,
) {
    let verbose = call.settings.is_verbose();
    sink.emit(StreamPart::StreamStart {
        warnings: call.warnings.clone(),
    })
    .await;

    match emit_run(&model_id, &call, &invocation, abort.as_ref(), &mut sink).await {
        Ok(()) => lifecycle(verbose, &model_id, "stream finished"),
        Err(err) => {
            tracing::debug!(model_id = %model_id, error = %err, "Codex stream failed");
            sink.fail(err).await;
        }
    }

    // Consumers see end of stream only after cleanup.
    invocation.cleanup();
    drop(sink);
}

async fn emit_run(
    model_id: &str,
    call: &PreparedCall,
    invocation: &Invocation,
    abort: Option<&AbortSignal>,
    sink: &mut ChannelSink,
) -> Result<(), ProviderError> {
    let mut process =
        CodexProcess::spawn(invocation).map_err(|e| classify_spawn_error(&e, &call.prompt))?;
    lifecycle(call.settings.is_verbose(), model_id, "spawned");

    let mut state = RequestState::new(model_id);
    let outcome = drive(&mut process, &mut state, sink, abort).await?;
    conclude(&state, &outcome, &call.prompt)?;

    let text = state.text.take().or_else(|| {
        tracing::debug!("No assistant message in stream, reading last-message file");
        invocation.read_last_message()
    });
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        let id = uuid::Uuid::new_v4().to_string();
        sink.emit(StreamPart::TextStart { id: id.clone() }).await;
        sink.emit(StreamPart::TextDelta {
            id: id.clone(),
            delta: text,
        })
        .await;
        sink.emit(StreamPart::TextEnd { id }).await;
    }

    sink.emit(StreamPart::Finish {
        finish_reason: FinishReason::Stop,
        usage: state.usage.map(Usage::from).unwrap_or_default(),
    })
    .await;
    Ok(())
}
