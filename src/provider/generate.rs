//! Non-streaming generation.

use chrono::Utc;

use crate::cli::{build_invocation, CodexProcess, Invocation};

use super::model::PreparedCall;
use super::runner::{conclude, drive, lifecycle, RequestState};
use super::{
    classify_spawn_error, AbortSignal, Content, FinishReason, GenerateResult, ProviderError,
    ProviderMetadata, ResponseMetadata, StreamPart, Usage,
};

/// Run one request to completion and aggregate its output.
///
/// Temp artifacts are removed whether the request succeeds or fails.
///
/// # Errors
///
/// Returns [`ProviderError::Aborted`] if `abort` fired (before or after
/// spawn), a classified spawn error, or [`ProviderError::ApiCall`] when the
/// CLI reports a failure or exits nonzero.
pub(crate) async fn generate(
    model_id: &str,
    call: PreparedCall,
    abort: Option<AbortSignal>,
) -> Result<GenerateResult, ProviderError> {
    let verbose = call.settings.is_verbose();

    if let Some(signal) = abort.as_ref().filter(|s| s.is_aborted()) {
        lifecycle(verbose, model_id, "aborted before spawn");
        return Err(ProviderError::Aborted {
            reason: signal.reason(),
        });
    }

    let mut invocation =
        build_invocation(&call.prompt, call.schema.as_ref(), &call.settings, model_id)?;
    let result = run(model_id, call, &invocation, abort.as_ref()).await;
    invocation.cleanup();

    match &result {
        Ok(_) => lifecycle(verbose, model_id, "completed"),
        Err(e) => tracing::debug!(model_id, error = %e, "Codex generate failed"),
    }
    result
}

async fn run(
    model_id: &str,
    call: PreparedCall,
    invocation: &Invocation,
    abort: Option<&AbortSignal>,
) -> Result<GenerateResult, ProviderError> {
    let mut process =
        CodexProcess::spawn(invocation).map_err(|e| classify_spawn_error(&e, &call.prompt))?;
    lifecycle(call.settings.is_verbose(), model_id, "spawned");

    let mut state = RequestState::new(model_id);
    let mut parts: Vec<StreamPart> = Vec::new();
    let outcome = drive(&mut process, &mut state, &mut parts, abort).await?;
    conclude(&state, &outcome, &call.prompt)?;

    let text = match state.text.take() {
        Some(text) => text,
        None => {
            tracing::debug!(
                path = %invocation.last_message_path.display(),
                "No assistant message in stream, reading last-message file"
            );
            invocation.read_last_message().unwrap_or_default()
        }
    };

    let mut content: Vec<Content> = parts
        .into_iter()
        .filter_map(|part| match part {
            StreamPart::ToolCall(tool_call) => Some(Content::ToolCall(tool_call)),
            StreamPart::ToolResult(result) => Some(Content::ToolResult(result)),
            _ => None,
        })
        .collect();
    content.push(Content::Text { text });

    let session_id = state.session_id.take();
    Ok(GenerateResult {
        content,
        usage: state.usage.map(Usage::from).unwrap_or_default(),
        finish_reason: FinishReason::Stop,
        warnings: call.warnings,
        response: ResponseMetadata {
            id: session_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timestamp: Utc::now(),
            model_id: model_id.to_string(),
        },
        provider_metadata: ProviderMetadata { session_id },
    })
}
