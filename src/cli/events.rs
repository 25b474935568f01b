//! Event types from `codex exec --experimental-json` output.
//!
//! Each stdout line is one JSON object tagged by `type`. Items nested in
//! `item.*` events carry their own kind tag, spelled `type` or `item_type`
//! depending on the CLI version.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Token counts reported on `turn.completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
}

impl TokenUsage {
    /// Input plus output. Cached input is a subset of input and is not added again.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Error body of a `turn.failed` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    #[serde(default)]
    pub message: String,
}

/// Events emitted by the CLI in experimental JSON mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    /// A new thread (session) started.
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    /// Older CLIs announce the session this way.
    #[serde(rename = "session.created")]
    SessionCreated { session_id: String },
    #[serde(rename = "turn.started")]
    TurnStarted,
    /// Turn finished; usage is final.
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<TokenUsage>,
    },
    /// Turn failed inside the agent. The process may still exit 0.
    #[serde(rename = "turn.failed")]
    TurnFailed {
        #[serde(default)]
        error: Option<TurnError>,
    },
    #[serde(rename = "item.started")]
    ItemStarted { item: CodexItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: CodexItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },
    /// Stream-level error.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Catch-all for event types this crate does not know yet.
    #[serde(other)]
    Unknown,
}

impl CodexEvent {
    /// Session identifier carried by this event, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted { thread_id } => Some(thread_id),
            Self::SessionCreated { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Failure message if this event reports a logical failure.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::TurnFailed { error } => Some(
                error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Codex turn failed".to_string()),
            ),
            Self::Error { message } => Some(
                message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Codex reported an error".to_string()),
            ),
            _ => None,
        }
    }

    /// The item carried by an `item.*` event.
    #[must_use]
    pub fn item(&self) -> Option<&CodexItem> {
        match self {
            Self::ItemStarted { item } | Self::ItemUpdated { item } | Self::ItemCompleted { item } => {
                Some(item)
            }
            _ => None,
        }
    }
}

/// One file touched by a `file_change` item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdateChange {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub kind: String,
}

/// A shell command run by the agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandExecution {
    pub command: String,
    pub aggregated_output: String,
    pub exit_code: Option<i64>,
    pub status: Option<String>,
    pub cwd: Option<String>,
}

/// A patch applied by the agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileChange {
    pub changes: Vec<FileUpdateChange>,
    pub status: Option<String>,
}

/// A call to a tool exposed by an MCP server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct McpToolCall {
    pub server: String,
    pub tool: String,
    pub arguments: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub status: Option<String>,
}

/// A web search run by the agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebSearch {
    pub query: String,
    pub results: Option<Value>,
}

/// Item payload, discriminated by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    AssistantMessage { text: String },
    Reasoning { text: String },
    CommandExecution(CommandExecution),
    FileChange(FileChange),
    McpToolCall(McpToolCall),
    WebSearch(WebSearch),
    /// Any kind this crate does not model, with its raw fields.
    Other { kind: String, fields: Map<String, Value> },
}

impl ItemKind {
    /// Canonical kind tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::AssistantMessage { .. } => "assistant_message",
            Self::Reasoning { .. } => "reasoning",
            Self::CommandExecution(_) => "command_execution",
            Self::FileChange(_) => "file_change",
            Self::McpToolCall(_) => "mcp_tool_call",
            Self::WebSearch(_) => "web_search",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// An `item.*` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexItem {
    /// Item identifier. Some CLI versions omit it.
    pub id: Option<String>,
    pub kind: ItemKind,
}

impl CodexItem {
    /// Final assistant text, if this is an assistant message.
    #[must_use]
    pub fn assistant_text(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::AssistantMessage { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct TextItem {
    #[serde(default)]
    text: String,
}

impl<'de> Deserialize<'de> for CodexItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;

        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let kind = fields
            .get("item_type")
            .or_else(|| fields.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| D::Error::missing_field("type"))?;

        let raw = Value::Object(fields.clone());
        let parsed = match kind.as_str() {
            "assistant_message" | "agent_message" => serde_json::from_value::<TextItem>(raw)
                .map(|t| ItemKind::AssistantMessage { text: t.text }),
            "reasoning" => {
                serde_json::from_value::<TextItem>(raw).map(|t| ItemKind::Reasoning { text: t.text })
            }
            "command_execution" => serde_json::from_value(raw).map(ItemKind::CommandExecution),
            "file_change" => serde_json::from_value(raw).map(ItemKind::FileChange),
            "mcp_tool_call" => serde_json::from_value(raw).map(ItemKind::McpToolCall),
            "web_search" => serde_json::from_value(raw).map(ItemKind::WebSearch),
            _ => Ok(ItemKind::Other {
                kind: kind.clone(),
                fields: fields.clone(),
            }),
        };

        // A known kind with an unexpected shape degrades to passthrough.
        let kind = parsed.unwrap_or(ItemKind::Other { kind, fields });
        Ok(Self { id, kind })
    }
}
