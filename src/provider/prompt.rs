//! Flattens a structured conversation into the single prompt string the
//! CLI takes as its positional argument.

use super::{AssistantPart, CallWarning, Message, UserPart};

/// Flatten `prompt` into text plus mapping warnings.
///
/// System text leads, followed by `Human:` / `Assistant:` /
/// `Tool Result (<name>):` blocks separated by blank lines.
#[must_use]
pub fn flatten_prompt(prompt: &[Message]) -> (String, Vec<CallWarning>) {
    let mut system: Vec<&str> = Vec::new();
    let mut blocks: Vec<String> = Vec::new();
    let mut warnings = Vec::new();
    let mut ignored_media = 0usize;

    for message in prompt {
        match message {
            Message::System { content } => {
                if !content.trim().is_empty() {
                    system.push(content);
                }
            }
            Message::User { content } => {
                let mut texts = Vec::new();
                for part in content {
                    match part {
                        UserPart::Text { text } => texts.push(text.as_str()),
                        UserPart::Image { .. } | UserPart::File { .. } => ignored_media += 1,
                    }
                }
                if !texts.is_empty() {
                    blocks.push(format!("Human: {}", texts.join("\n")));
                }
            }
            Message::Assistant { content } => {
                let mut texts = Vec::new();
                for part in content {
                    match part {
                        AssistantPart::Text { text } => texts.push(text.clone()),
                        AssistantPart::ToolCall {
                            tool_name, input, ..
                        } => texts.push(format!("Tool Call ({tool_name}): {input}")),
                        AssistantPart::Reasoning { .. } => {}
                    }
                }
                if !texts.is_empty() {
                    blocks.push(format!("Assistant: {}", texts.join("\n")));
                }
            }
            Message::Tool { content } => {
                for result in content {
                    blocks.push(format!(
                        "Tool Result ({}): {}",
                        result.tool_name, result.output
                    ));
                }
            }
        }
    }

    if ignored_media > 0 {
        warnings.push(CallWarning::Other {
            message: format!(
                "Codex CLI does not accept image/file inputs; {ignored_media} part(s) ignored"
            ),
        });
    }

    let mut text = String::new();
    if !system.is_empty() {
        text.push_str(&system.join("\n\n"));
        if !blocks.is_empty() {
            text.push_str("\n\n");
        }
    }
    text.push_str(&blocks.join("\n\n"));
    (text, warnings)
}
