//! Non-streaming generation tests.

use std::time::Duration;

use codex_cli_provider::config::{ReasoningEffort, Settings};
use codex_cli_provider::provider::{
    AbortSignal, CallOptions, CallWarning, Content, LanguageModel, ProviderError,
};
use serde_json::json;
use tempfile::TempDir;

use super::{emit, fake_codex, logged_args, logged_sidecar, model_for};

#[tokio::test]
async fn generate_returns_text_usage_and_session() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            r#"{"type":"thread.started","thread_id":"thread-42"}"#,
            r#"{"type":"turn.started"}"#,
            r#"{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"Looking around"}}"#,
            r#"{"type":"item.completed","item":{"id":"item_1","type":"assistant_message","text":"All done."}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":4,"output_tokens":2,"cached_input_tokens":1}}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let result = model.generate(CallOptions::from_text("Fix it")).await.unwrap();

    assert_eq!(result.text(), "All done.");
    assert_eq!(result.usage.input_tokens, 4);
    assert_eq!(result.usage.output_tokens, 2);
    assert_eq!(result.usage.cached_input_tokens, 1);
    assert_eq!(result.usage.total_tokens, 6);
    assert_eq!(result.provider_metadata.session_id.as_deref(), Some("thread-42"));
    assert_eq!(result.response.id, "thread-42");
    assert_eq!(result.response.model_id, "gpt-5-codex");
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn generate_falls_back_to_sidecar() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "printf 'Fallback last message\\n\\n' > \"$LAST\"\n{}",
        emit(&[
            r#"{"type":"thread.started","thread_id":"t-1"}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":1,"output_tokens":1}}"#,
        ])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());

    let result = model.generate(CallOptions::from_text("hi")).await.unwrap();
    assert_eq!(result.text(), "Fallback last message");
}

#[tokio::test]
async fn generate_empty_assistant_text_uses_sidecar() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "printf 'Fallback last message' > \"$LAST\"\n{}",
        emit(&[
            r#"{"type":"thread.started","thread_id":"t-1"}"#,
            r#"{"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":""}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":1,"output_tokens":1}}"#,
        ])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());

    let result = model.generate(CallOptions::from_text("hi")).await.unwrap();
    assert_eq!(result.text(), "Fallback last message");
}

#[tokio::test]
async fn generate_turn_failed_with_exit_zero_is_error() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}echo 'model overloaded' >&2\nexit 0\n",
        emit(&[
            r#"{"type":"thread.started","thread_id":"t-1"}"#,
            r#"{"type":"turn.failed","error":{"message":"stream disconnected"}}"#,
        ])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());

    let err = model
        .generate(CallOptions::from_text("do work"))
        .await
        .unwrap_err();
    match err {
        ProviderError::ApiCall {
            message,
            exit_code,
            stderr,
            prompt_excerpt,
        } => {
            assert_eq!(message, "stream disconnected");
            assert_eq!(exit_code, Some(0));
            assert!(stderr.contains("model overloaded"));
            assert_eq!(prompt_excerpt, "Human: do work");
        }
        other => panic!("Expected ApiCall, got {other:?}"),
    }
}

#[tokio::test]
async fn generate_nonzero_exit_is_error() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(&dir, "echo 'fatal: bad flag' >&2\nexit 2\n");
    let model = model_for(&codex, Settings::default());

    let err = model.generate(CallOptions::from_text("hi")).await.unwrap_err();
    assert_eq!(err.exit_code(), Some(2));
    assert!(!err.is_retryable());
    match err {
        ProviderError::ApiCall { stderr, .. } => assert!(stderr.contains("fatal: bad flag")),
        other => panic!("Expected ApiCall, got {other:?}"),
    }
}

#[tokio::test]
async fn generate_ignores_malformed_lines() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            "Reading prompt from stdin...",
            r#"{"type":"thread.started","thread_id":"t-7"}"#,
            r#"{"type":"item.completed","item":"#,
            "",
            "[2025-01-01T00:00:00] codex banner",
            r#"{"type":"item.completed","item":{"id":"a","item_type":"agent_message","text":"ok"}}"#,
            "null",
            r#"{"type":"turn.completed","usage":{"input_tokens":3,"output_tokens":1}}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let result = model.generate(CallOptions::from_text("hi")).await.unwrap();
    assert_eq!(result.text(), "ok");
    assert_eq!(result.usage.total_tokens, 4);
    assert_eq!(result.provider_metadata.session_id.as_deref(), Some("t-7"));
}

#[tokio::test]
async fn generate_reports_tool_calls_before_text() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[
            r#"{"type":"thread.started","thread_id":"t-1"}"#,
            r#"{"type":"item.started","item":{"id":"cmd_1","type":"command_execution","command":"cargo test","status":"in_progress"}}"#,
            r#"{"type":"item.updated","item":{"id":"cmd_1","type":"command_execution","command":"cargo test","aggregated_output":"running","status":"in_progress"}}"#,
            r#"{"type":"item.completed","item":{"id":"cmd_1","type":"command_execution","command":"cargo test","aggregated_output":"FAILED","exit_code":101,"status":"failed"}}"#,
            r#"{"type":"item.completed","item":{"id":"msg","type":"assistant_message","text":"Tests fail."}}"#,
        ]),
    );
    let model = model_for(&codex, Settings::default());

    let result = model.generate(CallOptions::from_text("run tests")).await.unwrap();

    assert_eq!(result.content.len(), 3);
    match &result.content[0] {
        Content::ToolCall(call) => {
            assert_eq!(call.tool_call_id, "cmd_1");
            assert_eq!(call.tool_name, "exec");
            assert!(call.provider_executed);
            let input: serde_json::Value = serde_json::from_str(&call.input).unwrap();
            assert_eq!(input["command"], "cargo test");
        }
        other => panic!("Expected tool call first, got {other:?}"),
    }
    match &result.content[1] {
        Content::ToolResult(res) => {
            assert_eq!(res.tool_call_id, "cmd_1");
            assert_eq!(res.is_error, Some(true));
            assert_eq!(res.result["exitCode"], 101);
            assert_eq!(res.result["aggregatedOutput"], "FAILED");
        }
        other => panic!("Expected tool result second, got {other:?}"),
    }
    assert!(matches!(&result.content[2], Content::Text { text } if text == "Tests fail."));
    // No usage event: zeroed.
    assert_eq!(result.usage.total_tokens, 0);
}

#[tokio::test]
async fn generate_warns_on_unsupported_settings() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[r#"{"type":"item.completed","item":{"id":"a","type":"assistant_message","text":"x"}}"#]),
    );
    let model = model_for(&codex, Settings::default());
    let options = CallOptions {
        temperature: Some(0.7),
        top_p: Some(0.9),
        ..CallOptions::from_text("hi")
    };

    let result = model.generate(options).await.unwrap();
    let settings: Vec<&str> = result
        .warnings
        .iter()
        .filter_map(|w| match w {
            CallWarning::UnsupportedSetting { setting, .. } => Some(setting.as_str()),
            CallWarning::Other { .. } => None,
        })
        .collect();
    assert_eq!(settings, ["temperature", "topP"]);
    // No session event: a generated id is used.
    assert!(result.provider_metadata.session_id.is_none());
    assert!(!result.response.id.is_empty());
}

#[tokio::test]
async fn per_call_settings_win() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(
        &dir,
        &emit(&[r#"{"type":"item.completed","item":{"id":"a","type":"assistant_message","text":"x"}}"#]),
    );
    let model = model_for(
        &codex,
        Settings {
            reasoning_effort: Some(ReasoningEffort::Low),
            ..Settings::default()
        },
    );
    let options = CallOptions::from_text("hi").with_settings(Settings {
        reasoning_effort: Some(ReasoningEffort::High),
        ..Settings::default()
    });

    model.generate(options).await.unwrap();

    let args = logged_args(&dir);
    let high = args
        .iter()
        .filter(|a| *a == "model_reasoning_effort=high")
        .count();
    assert_eq!(high, 1);
    assert!(!args.iter().any(|a| a.ends_with("=low")));
    assert_eq!(args[0], "exec");
    assert_eq!(args[1], "--experimental-json");
}

#[tokio::test]
async fn temp_artifacts_removed_after_success_and_failure() {
    for exit in [0, 3] {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "printf 'answer' > \"$LAST\"\n{}exit {exit}\n",
            emit(&[r#"{"type":"thread.started","thread_id":"t"}"#])
        );
        let codex = fake_codex(&dir, &body);
        let model = model_for(&codex, Settings::default());
        let options = CallOptions::from_text("hi").with_json_schema(json!({
            "type": "object",
            "properties": {"answer": {"type": "string", "format": "email"}},
            "required": ["answer"]
        }));

        let result = model.generate(options).await;
        assert_eq!(result.is_ok(), exit == 0);

        let args = logged_args(&dir);
        let schema_pos = args.iter().position(|a| a == "--output-schema").unwrap();
        let schema_path = std::path::PathBuf::from(&args[schema_pos + 1]);
        assert!(!schema_path.exists());
        assert!(!schema_path.parent().unwrap().exists());

        let sidecar = logged_sidecar(&dir);
        assert!(!sidecar.exists());
        assert!(!sidecar.parent().unwrap().exists());
    }
}

#[tokio::test]
async fn user_sidecar_survives() {
    let dir = TempDir::new().unwrap();
    let user_sidecar = dir.path().join("keep-me.txt");
    let codex = fake_codex(&dir, "printf 'kept answer' > \"$LAST\"\n");
    let model = model_for(
        &codex,
        Settings {
            output_last_message_file: Some(user_sidecar.clone()),
            ..Settings::default()
        },
    );

    let result = model.generate(CallOptions::from_text("hi")).await.unwrap();

    assert_eq!(result.text(), "kept answer");
    assert_eq!(logged_sidecar(&dir), user_sidecar);
    assert_eq!(std::fs::read_to_string(&user_sidecar).unwrap(), "kept answer");
}

#[tokio::test]
async fn abort_before_spawn_never_runs_cli() {
    let dir = TempDir::new().unwrap();
    let codex = fake_codex(&dir, "");
    let model = model_for(&codex, Settings::default());
    let signal = AbortSignal::new();
    signal.abort("caller gave up");

    let err = model
        .generate(CallOptions::from_text("hi").with_abort(signal))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Aborted { ref reason } if reason == "caller gave up"));
    assert!(logged_args(&dir).is_empty());
}

#[tokio::test]
async fn abort_after_spawn_terminates_cli() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}exec sleep 30\n",
        emit(&[r#"{"type":"thread.started","thread_id":"t"}"#])
    );
    let codex = fake_codex(&dir, &body);
    let model = model_for(&codex, Settings::default());
    let signal = AbortSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.abort("stop now");
    });

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        model.generate(CallOptions::from_text("hi").with_abort(signal)),
    )
    .await
    .expect("abort should end the request");

    match result {
        Err(ProviderError::Aborted { reason }) => assert_eq!(reason, "stop now"),
        other => panic!("Expected Aborted, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_is_api_call_error() {
    let dir = TempDir::new().unwrap();
    let model = model_for(&dir.path().join("does-not-exist"), Settings::default());

    let err = model.generate(CallOptions::from_text("hi")).await.unwrap_err();
    match err {
        ProviderError::ApiCall {
            message, exit_code, ..
        } => {
            assert!(message.contains("not found"));
            assert!(exit_code.is_none());
        }
        other => panic!("Expected ApiCall, got {other:?}"),
    }
}
