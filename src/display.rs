//! Colored terminal output for the `codex-provider` binary.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;
use serde_json::Value;

use crate::provider::{CallWarning, GenerateResult, ProviderError, StreamPart, ToolResult, Usage};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to `max_len` characters, adding an ellipsis if cut.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Format a JSON tool payload as `key=value` pairs, truncating long values.
#[must_use]
pub fn format_tool_input(input: &Value, raw_mode: bool) -> String {
    match input {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let value_str = match v {
                    Value::String(s) => truncate(s, 50, raw_mode),
                    other => truncate(&other.to_string(), 50, raw_mode),
                };
                format!("{k}={value_str}")
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

fn usage_summary(usage: &Usage) -> String {
    format!(
        "tokens: {} in ({} cached), {} out, {} total",
        usage.input_tokens, usage.cached_input_tokens, usage.output_tokens, usage.total_tokens
    )
}

/// Print warnings attached to a call.
pub fn print_warnings(warnings: &[CallWarning]) {
    for warning in warnings {
        let text = match warning {
            CallWarning::UnsupportedSetting { setting, details } => match details {
                Some(details) => format!("{setting}: {details}"),
                None => format!("{setting} is not supported"),
            },
            CallWarning::Other { message } => message.clone(),
        };
        eprintln!("{} {} {}", timestamp().dimmed(), "[WARN]".yellow().bold(), text);
    }
}

fn print_tool_result(result: &ToolResult, raw_mode: bool) {
    let label = if result.is_error.unwrap_or(false) {
        "[RESULT]".red().bold().to_string()
    } else {
        "[RESULT]".green().bold().to_string()
    };
    println!(
        "{} {} {} {}",
        label,
        result.tool_name.cyan(),
        truncate(&result.tool_call_id, 12, raw_mode).dimmed(),
        format_tool_input(&result.result, raw_mode)
    );
}

/// Print one stream part as it arrives.
pub fn print_stream_part(part: &StreamPart, raw_mode: bool) {
    match part {
        StreamPart::StreamStart { warnings } => print_warnings(warnings),
        StreamPart::ResponseMetadata(meta) => {
            println!(
                "{} {} model={}, session={}",
                timestamp().dimmed(),
                "[SESSION]".blue().bold(),
                meta.model_id.cyan(),
                truncate(&meta.id, 20, raw_mode).dimmed()
            );
        }
        StreamPart::ToolCall(call) => {
            let input: Value =
                serde_json::from_str(&call.input).unwrap_or_else(|_| Value::String(call.input.clone()));
            println!(
                "{} {} {}",
                "[TOOL]".yellow().bold(),
                call.tool_name.cyan(),
                format_tool_input(&input, raw_mode)
            );
        }
        StreamPart::ToolResult(result) => print_tool_result(result, raw_mode),
        StreamPart::TextDelta { delta, .. } => print!("{delta}"),
        StreamPart::TextEnd { .. } => println!(),
        StreamPart::Finish { usage, .. } => {
            println!(
                "{} {} {}",
                timestamp().dimmed(),
                "[DONE]".blue().bold(),
                usage_summary(usage).dimmed()
            );
        }
        StreamPart::ToolInputStart { .. }
        | StreamPart::ToolInputDelta { .. }
        | StreamPart::ToolInputEnd { .. }
        | StreamPart::TextStart { .. } => {}
    }
    let _ = io::stdout().flush();
}

/// Print an aggregated non-streaming result.
pub fn print_generate_result(result: &GenerateResult, raw_mode: bool) {
    print_warnings(&result.warnings);
    for call in result.tool_calls() {
        print_stream_part(&StreamPart::ToolCall(call.clone()), raw_mode);
    }
    for tool_result in result.tool_results() {
        print_tool_result(tool_result, raw_mode);
    }
    println!("{}", result.text());
    println!(
        "{} {} session={} {}",
        timestamp().dimmed(),
        "[DONE]".blue().bold(),
        truncate(&result.response.id, 20, raw_mode).dimmed(),
        usage_summary(&result.usage).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a provider error with its diagnostics.
pub fn print_error(err: &ProviderError) {
    eprintln!("{} {}", "[ERROR]".red().bold(), err);
    if let ProviderError::ApiCall { stderr, .. } = err {
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            eprintln!("{}", truncate(stderr, 400, false).dimmed());
        }
    }
    if err.is_authentication() {
        eprintln!("{}", "Run `codex login` and try again.".yellow());
    }
}
