//! Builds the `codex exec` invocation for one request.
//!
//! The builder is pure except for the temporary schema and sidecar
//! directories. Those are owned by the returned [`Invocation`] and removed
//! when it is cleaned up or dropped.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde_json::Value;
use tempfile::TempDir;

use crate::cli::schema::prepare_output_schema;
use crate::config::{ApprovalMode, ConfigValue, SandboxMode, Settings};

/// Default executable, resolved through `PATH`.
pub const DEFAULT_CODEX_BINARY: &str = "codex";

/// Log filter handed to the CLI when the caller has not chosen one.
pub const DEFAULT_RUST_LOG: &str = "error";

/// File name of the auto-generated final-message sidecar.
pub const LAST_MESSAGE_FILE: &str = "last-message.txt";

/// Temporary directories owned by an invocation.
#[derive(Debug, Default)]
struct TempArtifacts {
    schema_dir: Option<TempDir>,
    sidecar_dir: Option<TempDir>,
}

/// Fully resolved subprocess invocation.
#[derive(Debug)]
pub struct Invocation {
    /// Executable to spawn.
    pub program: PathBuf,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Complete environment for the child.
    pub env: HashMap<String, String>,
    /// Working directory, inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Schema file, present only for structured output.
    pub schema_path: Option<PathBuf>,
    /// Where the CLI writes its final answer.
    pub last_message_path: PathBuf,
    artifacts: TempArtifacts,
}

impl Invocation {
    /// Whether the sidecar path was generated (and will be deleted).
    #[must_use]
    pub fn owns_last_message_file(&self) -> bool {
        self.artifacts.sidecar_dir.is_some()
    }

    /// Value following the first occurrence of `flag`, if any.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// All `-c` override values in order.
    #[must_use]
    pub fn config_overrides(&self) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|w| w[0] == "-c")
            .map(|w| w[1].as_str())
            .collect()
    }

    /// Read the sidecar file, trimmed. Empty or missing files yield `None`.
    #[must_use]
    pub fn read_last_message(&self) -> Option<String> {
        match std::fs::read_to_string(&self.last_message_path) {
            Ok(content) => {
                let trimmed = content.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(e) => {
                tracing::debug!(
                    path = %self.last_message_path.display(),
                    error = %e,
                    "No last-message file"
                );
                None
            }
        }
    }

    /// Remove temporary artifacts. Failures are logged and swallowed.
    pub fn cleanup(&mut self) {
        for dir in [
            self.artifacts.schema_dir.take(),
            self.artifacts.sidecar_dir.take(),
        ]
        .into_iter()
        .flatten()
        {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp dir");
            }
        }
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Build the invocation for `prompt` against `model_id`.
///
/// `output_schema` requests structured output; it is sanitized and written
/// to a temp file only if it keeps at least one property.
///
/// # Errors
///
/// Returns an I/O error if a temp directory or the schema file cannot be
/// created, or a serialization error wrapped as I/O.
pub fn build_invocation(
    prompt: &str,
    output_schema: Option<&Value>,
    settings: &Settings,
    model_id: &str,
) -> std::io::Result<Invocation> {
    let mut args: Vec<String> = vec!["exec".to_string(), "--experimental-json".to_string()];
    let mut artifacts = TempArtifacts::default();

    push_autonomy_args(&mut args, settings);

    if settings.skip_git_repo_check.unwrap_or(true) {
        args.push("--skip-git-repo-check".to_string());
    }

    if let Some(effort) = settings.reasoning_effort {
        push_override(&mut args, "model_reasoning_effort", effort.as_str());
    }
    if let Some(summary) = settings.reasoning_summary {
        push_override(&mut args, "model_reasoning_summary", summary.as_str());
    }
    if let Some(format) = settings.reasoning_summary_format {
        push_override(&mut args, "model_reasoning_summary_format", format.as_str());
    }
    if let Some(verbosity) = settings.model_verbosity {
        push_override(&mut args, "model_verbosity", verbosity.as_str());
    }

    if settings.include_plan_tool.unwrap_or(false) {
        args.push("--include-plan-tool".to_string());
    }
    if let Some(profile) = &settings.profile {
        args.push("--profile".to_string());
        args.push(profile.clone());
    }
    if settings.oss.unwrap_or(false) {
        args.push("--oss".to_string());
    }
    if settings.web_search.unwrap_or(false) {
        push_override(&mut args, "tools.web_search", "true");
    }

    if let Some(color) = settings.color {
        args.push("--color".to_string());
        args.push(color.as_str().to_string());
    }

    args.push("-m".to_string());
    args.push(model_id.to_string());

    if let Some(dirs) = &settings.add_dirs {
        for dir in dirs {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }
    }

    if let Some(overrides) = &settings.config_overrides {
        for (key, value) in flatten_config_overrides(overrides) {
            push_override(&mut args, &key, &value);
        }
    }

    let mut schema_path = None;
    if let Some(schema) = output_schema {
        if let Some(prepared) = prepare_output_schema(schema) {
            let dir = tempfile::Builder::new().prefix("codex-schema-").tempdir()?;
            let path = dir.path().join("schema.json");
            let json = serde_json::to_string_pretty(&prepared)?;
            std::fs::write(&path, json)?;
            args.push("--output-schema".to_string());
            args.push(path.display().to_string());
            schema_path = Some(path);
            artifacts.schema_dir = Some(dir);
        } else {
            tracing::debug!("Output schema has no properties, not passing --output-schema");
        }
    }

    args.push(prompt.to_string());

    let last_message_path = if let Some(path) = &settings.output_last_message_file {
        path.clone()
    } else {
        let dir = tempfile::Builder::new().prefix("codex-cli-").tempdir()?;
        let path = dir.path().join(LAST_MESSAGE_FILE);
        artifacts.sidecar_dir = Some(dir);
        path
    };
    args.push("--output-last-message".to_string());
    args.push(last_message_path.display().to_string());

    let program = settings
        .codex_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CODEX_BINARY));

    Ok(Invocation {
        program,
        args,
        env: build_env(std::env::vars(), settings.env.as_ref()),
        cwd: settings.cwd.clone(),
        schema_path,
        last_message_path,
        artifacts,
    })
}

fn push_autonomy_args(args: &mut Vec<String>, settings: &Settings) {
    if settings.full_auto.unwrap_or(false) {
        args.push("--full-auto".to_string());
    } else if settings
        .dangerously_bypass_approvals_and_sandbox
        .unwrap_or(false)
    {
        args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
    } else {
        let approval = settings.approval_mode.unwrap_or(ApprovalMode::OnFailure);
        let sandbox = settings.sandbox_mode.unwrap_or(SandboxMode::WorkspaceWrite);
        push_override(args, "approval_policy", approval.as_str());
        push_override(args, "sandbox_mode", sandbox.as_str());
    }
}

fn push_override(args: &mut Vec<String>, key: &str, value: &str) {
    args.push("-c".to_string());
    args.push(format!("{key}={value}"));
}

/// Flatten an override map into `(dotted.key, value)` pairs.
///
/// Non-empty tables recurse; empty tables and arrays are kept as `{}` / `[]`
/// so a higher settings layer can clear a lower one.
#[must_use]
pub fn flatten_config_overrides(overrides: &BTreeMap<String, ConfigValue>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in overrides {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(key: &str, value: &ConfigValue, out: &mut Vec<(String, String)>) {
    match value {
        ConfigValue::Table(table) if !table.is_empty() => {
            for (child, child_value) in table {
                flatten_into(&format!("{key}.{child}"), child_value, out);
            }
        }
        ConfigValue::Table(_) => out.push((key.to_string(), "{}".to_string())),
        other => out.push((key.to_string(), other.to_string())),
    }
}

fn build_env(
    inherited: impl Iterator<Item = (String, String)>,
    overrides: Option<&BTreeMap<String, String>>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = inherited.collect();
    if let Some(overrides) = overrides {
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    env.entry("RUST_LOG".to_string())
        .or_insert_with(|| DEFAULT_RUST_LOG.to_string());
    env
}
