//! SDK-facing request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::TokenUsage;
use crate::config::Settings;

use super::AbortSignal;

/// A user message part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserPart {
    Text { text: String },
    Image { media_type: String },
    File {
        media_type: String,
        #[serde(default)]
        filename: Option<String>,
    },
}

/// An assistant message part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantPart {
    Text { text: String },
    Reasoning { text: String },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
}

/// Result of a tool the caller executed in an earlier turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: Vec<UserPart> },
    Assistant { content: Vec<AssistantPart> },
    Tool { content: Vec<ToolResultPart> },
}

impl Message {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![UserPart::Text { text: text.into() }],
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![AssistantPart::Text { text: text.into() }],
        }
    }
}

/// A structured conversation.
pub type Prompt = Vec<Message>;

/// Requested response format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json {
        #[serde(default)]
        schema: Option<Value>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Options for a single generate or stream call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub prompt: Prompt,
    pub response_format: Option<ResponseFormat>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    /// Per-call settings layered over the model's settings.
    pub provider_options: Option<Settings>,
    pub abort: Option<AbortSignal>,
}

impl CallOptions {
    #[must_use]
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            ..Default::default()
        }
    }

    /// Shorthand for a single user message.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.provider_options = Some(settings);
        self
    }

    #[must_use]
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }

    #[must_use]
    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.response_format = Some(ResponseFormat::Json {
            schema: Some(schema),
            name: None,
            description: None,
        });
        self
    }

    /// Schema to enforce, if structured output was requested.
    #[must_use]
    pub fn output_schema(&self) -> Option<&Value> {
        match &self.response_format {
            Some(ResponseFormat::Json {
                schema: Some(schema),
                ..
            }) => Some(schema),
            _ => None,
        }
    }

    /// Warnings for generation parameters the CLI ignores.
    #[must_use]
    pub fn unsupported_setting_warnings(&self) -> Vec<CallWarning> {
        let ignored = [
            ("temperature", self.temperature.is_some()),
            ("topP", self.top_p.is_some()),
            ("topK", self.top_k.is_some()),
            ("presencePenalty", self.presence_penalty.is_some()),
            ("frequencyPenalty", self.frequency_penalty.is_some()),
            ("stopSequences", self.stop_sequences.as_ref().is_some_and(|s| !s.is_empty())),
            ("seed", self.seed.is_some()),
        ];
        ignored
            .into_iter()
            .filter(|(_, set)| *set)
            .map(|(setting, _)| CallWarning::UnsupportedSetting {
                setting: setting.to_string(),
                details: Some("Codex CLI does not support this setting; it is ignored".to_string()),
            })
            .collect()
    }
}

/// A non-fatal notice attached to a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallWarning {
    UnsupportedSetting {
        setting: String,
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_input_tokens: u64,
}

impl From<TokenUsage> for Usage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            cached_input_tokens: usage.cached_input_tokens,
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
}

/// Response metadata: session id when known, timestamp and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
}

/// Provider-specific result metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub session_id: Option<String>,
}

/// A provider-executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    /// JSON-encoded input payload.
    pub input: String,
    pub provider_executed: bool,
}

/// Result of a provider-executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    pub provider_executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Incremental stream output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    StreamStart {
        warnings: Vec<CallWarning>,
    },
    ResponseMetadata(ResponseMetadata),
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        id: String,
        tool_name: String,
        provider_executed: bool,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
    },
}

/// One entry of a non-streaming result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// Aggregated non-streaming result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResult {
    pub content: Vec<Content>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub warnings: Vec<CallWarning>,
    pub response: ResponseMetadata,
    pub provider_metadata: ProviderMetadata,
}

impl GenerateResult {
    /// Concatenated text content.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls in arrival order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|c| match c {
            Content::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// Tool results in arrival order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|c| match c {
            Content::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}
