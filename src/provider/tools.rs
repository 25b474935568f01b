//! Tool lifecycle tracking.
//!
//! Tool-kind items (commands, patches, MCP calls, web searches) are reported
//! to the caller as provider-executed tool calls. Each item yields exactly one
//! call sequence and one result, call first.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{json, Map, Value};

use crate::cli::{CodexItem, ItemKind};

use super::{StreamPart, ToolCall, ToolResult};

/// Which `item.*` event delivered an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Started,
    Updated,
    Completed,
}

#[derive(Debug)]
struct ActiveTool {
    tool_name: String,
    input: Value,
    call_emitted: bool,
    anonymous: bool,
}

/// Keyed table of in-flight tool items.
#[derive(Debug, Default)]
pub struct ToolTracker {
    active: HashMap<String, ActiveTool>,
    /// Synthesized keys of id-less items, oldest first, per tool name.
    anonymous: HashMap<String, VecDeque<String>>,
    /// Keys whose result was already emitted. Later events for them are ignored.
    completed: HashSet<String>,
}

impl ToolTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tool items awaiting completion.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Feed one item event; returns the parts to emit, in order.
    pub fn on_item(&mut self, phase: ItemPhase, item: &CodexItem) -> Vec<StreamPart> {
        let Some(tool_name) = tool_name(&item.kind) else {
            return Vec::new();
        };

        let Some((key, anonymous)) = self.resolve_key(phase, item, &tool_name) else {
            return Vec::new();
        };
        if self.completed.contains(&key) {
            tracing::debug!(item_id = %key, "Ignoring event for completed tool item");
            return Vec::new();
        }
        let input = input_payload(&item.kind);

        let entry = self.active.entry(key.clone()).or_insert_with(|| ActiveTool {
            tool_name: tool_name.clone(),
            input: Value::Null,
            call_emitted: false,
            anonymous,
        });
        entry.input = input;

        let mut parts = Vec::new();
        if !entry.call_emitted {
            entry.call_emitted = true;
            parts.extend(call_sequence(&key, &entry.tool_name, &entry.input));
            tracing::debug!(item_id = %key, tool = %entry.tool_name, "Tool call started");
        }

        if phase == ItemPhase::Completed {
            if let Some(done) = self.active.remove(&key) {
                if done.anonymous {
                    self.forget_anonymous(&done.tool_name, &key);
                }
                self.completed.insert(key.clone());
                let result = build_result(&key, &done.tool_name, item);
                tracing::debug!(
                    item_id = %key,
                    tool = %done.tool_name,
                    is_error = result.is_error.unwrap_or(false),
                    "Tool call completed"
                );
                parts.push(StreamPart::ToolResult(result));
            }
        }
        parts
    }

    fn resolve_key(
        &mut self,
        phase: ItemPhase,
        item: &CodexItem,
        tool_name: &str,
    ) -> Option<(String, bool)> {
        if let Some(id) = &item.id {
            return Some((id.clone(), false));
        }
        // Correlate an id-less follow-up with the oldest open id-less item of
        // the same tool.
        let queue = self.anonymous.entry(tool_name.to_string()).or_default();
        if phase != ItemPhase::Started {
            if let Some(key) = queue.front() {
                return Some((key.clone(), true));
            }
        }
        // An id-less update with nothing open cannot be correlated.
        if phase == ItemPhase::Updated {
            tracing::debug!(tool = %tool_name, "Ignoring id-less update with no open item");
            return None;
        }
        let key = format!("{tool_name}-{}", uuid::Uuid::new_v4());
        tracing::debug!(tool = %tool_name, key = %key, "Item without id, synthesized key");
        if phase != ItemPhase::Completed {
            queue.push_back(key.clone());
        }
        Some((key, true))
    }

    fn forget_anonymous(&mut self, tool_name: &str, key: &str) {
        if let Some(queue) = self.anonymous.get_mut(tool_name) {
            queue.retain(|k| k != key);
        }
    }
}

/// Tool name for an item kind; `None` for non-tool kinds.
#[must_use]
pub fn tool_name(kind: &ItemKind) -> Option<String> {
    match kind {
        ItemKind::CommandExecution(_) => Some("exec".to_string()),
        ItemKind::FileChange(_) => Some("patch".to_string()),
        ItemKind::McpToolCall(call) if !call.tool.is_empty() => Some(call.tool.clone()),
        ItemKind::McpToolCall(_) => Some("mcp_tool".to_string()),
        ItemKind::WebSearch(_) => Some("web_search".to_string()),
        ItemKind::AssistantMessage { .. } | ItemKind::Reasoning { .. } | ItemKind::Other { .. } => {
            None
        }
    }
}

fn call_sequence(id: &str, tool_name: &str, input: &Value) -> Vec<StreamPart> {
    let serialized = input.to_string();
    vec![
        StreamPart::ToolInputStart {
            id: id.to_string(),
            tool_name: tool_name.to_string(),
            provider_executed: true,
        },
        StreamPart::ToolInputDelta {
            id: id.to_string(),
            delta: serialized.clone(),
        },
        StreamPart::ToolInputEnd { id: id.to_string() },
        StreamPart::ToolCall(ToolCall {
            tool_call_id: id.to_string(),
            tool_name: tool_name.to_string(),
            input: serialized,
            provider_executed: true,
        }),
    ]
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

/// Input summary captured when a tool item is first seen.
#[must_use]
pub fn input_payload(kind: &ItemKind) -> Value {
    let mut map = Map::new();
    match kind {
        ItemKind::CommandExecution(cmd) => {
            map.insert("command".to_string(), json!(cmd.command));
            insert_opt(&mut map, "status", cmd.status.clone().map(Value::String));
            insert_opt(&mut map, "cwd", cmd.cwd.clone().map(Value::String));
        }
        ItemKind::FileChange(change) => {
            map.insert("changes".to_string(), json!(change.changes));
            insert_opt(&mut map, "status", change.status.clone().map(Value::String));
        }
        ItemKind::McpToolCall(call) => {
            map.insert("server".to_string(), json!(call.server));
            map.insert("tool".to_string(), json!(call.tool));
            insert_opt(&mut map, "status", call.status.clone().map(Value::String));
            insert_opt(&mut map, "arguments", call.arguments.clone());
        }
        ItemKind::WebSearch(search) => {
            map.insert("query".to_string(), json!(search.query));
        }
        ItemKind::Other { fields, .. } => {
            map.extend(
                fields
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "type" | "item_type" | "id"))
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        ItemKind::AssistantMessage { .. } | ItemKind::Reasoning { .. } => {}
    }
    Value::Object(map)
}

fn is_failed(status: Option<&str>) -> bool {
    status == Some("failed")
}

fn build_result(id: &str, tool_name: &str, item: &CodexItem) -> ToolResult {
    let mut metadata = Map::new();
    metadata.insert("itemType".to_string(), json!(item.kind.tag()));
    metadata.insert("itemId".to_string(), json!(id));

    let (result, is_error) = match &item.kind {
        ItemKind::CommandExecution(cmd) => {
            let result = json!({
                "command": cmd.command,
                "aggregatedOutput": cmd.aggregated_output,
                "exitCode": cmd.exit_code,
                "status": cmd.status,
            });
            let failed = cmd.exit_code.is_some_and(|c| c != 0) || is_failed(cmd.status.as_deref());
            if let Some(cwd) = &cmd.cwd {
                metadata.insert("cwd".to_string(), json!(cwd));
            }
            (result, failed)
        }
        ItemKind::FileChange(change) => {
            let result = json!({
                "changes": change.changes,
                "status": change.status,
            });
            (result, is_failed(change.status.as_deref()))
        }
        ItemKind::McpToolCall(call) => {
            let mut result = Map::new();
            result.insert("server".to_string(), json!(call.server));
            result.insert("tool".to_string(), json!(call.tool));
            result.insert("status".to_string(), json!(call.status));
            insert_opt(&mut result, "result", call.result.clone());
            insert_opt(&mut result, "error", call.error.clone());
            metadata.insert("server".to_string(), json!(call.server));
            let failed = is_failed(call.status.as_deref()) || call.error.as_ref().is_some_and(|e| !e.is_null());
            (Value::Object(result), failed)
        }
        ItemKind::WebSearch(search) => {
            let mut result = Map::new();
            result.insert("query".to_string(), json!(search.query));
            insert_opt(&mut result, "results", search.results.clone());
            (Value::Object(result), false)
        }
        other => (input_payload(other), false),
    };

    ToolResult {
        tool_call_id: id.to_string(),
        tool_name: tool_name.to_string(),
        result,
        is_error: is_error.then_some(true),
        provider_executed: true,
        metadata: Some(Value::Object(metadata)),
    }
}
