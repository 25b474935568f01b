//! Streaming tests.

use codex_cli_provider::config::Settings;
use codex_cli_provider::provider::{
    AbortSignal, CallOptions, FinishReason, LanguageModel, ProviderError, StreamPart,
};
use futures_util::StreamExt;
use tempfile::TempDir;

use super::{emit, fake_codex, logged_args, logged_sidecar, model_for};

fn kind(part: &StreamPart) -> &'static str {
    match part {
        StreamPart::StreamStart { .. } => "stream-start",
        StreamPart::ResponseMetadata(_) => "response-metadata",
        StreamPart::ToolInputStart { .. } => "tool-input-start",
        StreamPart::ToolInputDelta { .. } => "tool-input-delta",
        StreamPart::ToolInputEnd { .. } => "tool-input-end",
        StreamPart::ToolCall(_) => "tool-call",
        StreamPart::ToolResult(_) => "tool-result",
        StreamPart::TextStart { .. } => "text-start",
        StreamPart::TextDelta { .. } => "text-delta",
        StreamPart::TextEnd { .. } => "text-end",
        StreamPart::Finish { .. } => "finish",
    }
}

#[tokio::test]
async fn stream_emits_parts_in_order() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            r#"{"type":"thread.started","thread_id":"thread-9"}"#,
            r#"{"type":"session.created","session_id":"legacy-9"}"#,
            r#"{"type":"item.started","item":{"id":"c1","type":"command_execution","command":"ls","status":"in_progress"}}"#,
            r#"{"type":"item.completed","item":{"id":"c1","type":"command_execution","command":"ls","aggregated_output":"src\n","exit_code":0,"status":"completed"}}"#,
            r#"{"type":"item.completed","item":{"id":"m1","type":"assistant_message","text":"Hello"}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":4,"output_tokens":2,"cached_input_tokens":1}}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let parts = model
        .stream(CallOptions::from_text("list files"))
        .await
        .unwrap()
        .into_parts()
        .await
        .unwrap();

    let kinds: Vec<_> = parts.iter().map(kind).collect();
    assert_eq!(
        kinds,
        [
            "stream-start",
            "response-metadata",
            "tool-input-start",
            "tool-input-delta",
            "tool-input-end",
            "tool-call",
            "tool-result",
            "text-start",
            "text-delta",
            "text-end",
            "finish",
        ]
    );

    match &parts[1] {
        StreamPart::ResponseMetadata(meta) => {
            assert_eq!(meta.id, "thread-9");
            assert_eq!(meta.model_id, "gpt-5-codex");
        }
        other => panic!("Expected metadata, got {other:?}"),
    }
    match &parts[8] {
        StreamPart::TextDelta { delta, .. } => assert_eq!(delta, "Hello"),
        other => panic!("Expected text delta, got {other:?}"),
    }
    match &parts[10] {
        StreamPart::Finish {
            finish_reason,
            usage,
        } => {
            assert_eq!(*finish_reason, FinishReason::Stop);
            assert_eq!(usage.total_tokens, 6);
        }
        other => panic!("Expected finish, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_text_ids_match() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[r#"{"type":"item.completed","item":{"id":"m","type":"assistant_message","text":"hi"}}"#]),
    );
    let model = model_for(&codex, Settings::default());

    let parts = model
        .stream(CallOptions::from_text("hi"))
        .await
        .unwrap()
        .into_parts()
        .await
        .unwrap();

    let ids: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::TextStart { id } | StreamPart::TextDelta { id, .. } | StreamPart::TextEnd { id } => {
                Some(id.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| *id == ids[0]));
    // No usage event: finish carries zeroed usage.
    match parts.last() {
        Some(StreamPart::Finish { usage, .. }) => assert_eq!(usage.total_tokens, 0),
        other => panic!("Expected finish, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_uses_sidecar_fallback_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "printf '  Fallback last message  ' > \"$LAST\"\n{}",
        emit(&[r#"{"type":"turn.completed","usage":{"input_tokens":1,"output_tokens":1}}"#])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());

    let parts = model
        .stream(CallOptions::from_text("hi"))
        .await
        .unwrap()
        .into_parts()
        .await
        .unwrap();

    let text: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, ["Fallback last message"]);

    let sidecar = logged_sidecar(&dir);
    assert!(!sidecar.parent().unwrap().exists());
}

#[tokio::test]
async fn stream_failure_ends_with_error() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            r#"{"type":"thread.started","thread_id":"t"}"#,
            r#"{"type":"error","message":"unexpected status 401"}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let mut stream = model.stream(CallOptions::from_text("hi")).await.unwrap();
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }

    assert!(matches!(items.first(), Some(Ok(StreamPart::StreamStart { .. }))));
    assert!(!items
        .iter()
        .any(|i| matches!(i, Ok(StreamPart::Finish { .. }))));
    match items.last() {
        Some(Err(ProviderError::ApiCall {
            message, exit_code, ..
        })) => {
            assert_eq!(message, "unexpected status 401");
            assert_eq!(*exit_code, Some(0));
        }
        other => panic!("Expected ApiCall error last, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_abort_before_spawn() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(&dir, "");
    let model = model_for(&codex, Settings::default());
    let signal = AbortSignal::new();
    signal.abort("not today");

    let err = model
        .stream(CallOptions::from_text("hi").with_abort(signal))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Aborted { ref reason } if reason == "not today"));
    assert!(logged_args(&dir).is_empty());
}

#[tokio::test]
async fn stream_id_less_tool_items_correlate() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            r#"{"type":"item.started","item":{"type":"web_search","query":"tokio select"}}"#,
            r#"{"type":"item.completed","item":{"type":"web_search","query":"tokio select"}}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let parts = model
        .stream(CallOptions::from_text("search"))
        .await
        .unwrap()
        .into_parts()
        .await
        .unwrap();

    let call_ids: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::ToolCall(call) => Some(call.tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    let result_ids: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::ToolResult(result) => Some(result.tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(call_ids.len(), 1);
    assert_eq!(call_ids, result_ids);
}

#[tokio::test]
async fn stream_drop_terminates_codex() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}exec sleep 30\n",
        emit(&[r#"{"type":"thread.started","thread_id":"t-slow"}"#])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());

    let mut stream = model.stream(CallOptions::from_text("hang")).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!((kind(&first), kind(&second)), ("stream-start", "response-metadata"));
    drop(stream);

    // The request temp dir goes away once the subprocess has been reaped.
    let sidecar = logged_sidecar(&dir);
    let request_dir = sidecar.parent().unwrap().to_path_buf();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while request_dir.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(!request_dir.exists());
}
