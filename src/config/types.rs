//! Provider settings and the layered merge that resolves them per request.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Approval policy passed to the CLI as `approval_policy=<value>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Untrusted,
    #[default]
    OnFailure,
    OnRequest,
    Never,
}

impl ApprovalMode {
    /// The spelling the CLI expects.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::OnFailure => "on-failure",
            Self::OnRequest => "on-request",
            Self::Never => "never",
        }
    }
}

/// Sandbox mode passed to the CLI as `sandbox_mode=<value>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    #[default]
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    /// The spelling the CLI expects.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

/// Reasoning effort knob (`model_reasoning_effort`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Reasoning summary knob (`model_reasoning_summary`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Auto,
    Concise,
    Detailed,
    None,
}

impl ReasoningSummary {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Concise => "concise",
            Self::Detailed => "detailed",
            Self::None => "none",
        }
    }
}

/// Reasoning summary format knob (`model_reasoning_summary_format`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummaryFormat {
    None,
    Experimental,
}

impl ReasoningSummaryFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Experimental => "experimental",
        }
    }
}

/// Output verbosity knob (`model_verbosity`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelVerbosity {
    Low,
    Medium,
    High,
}

impl ModelVerbosity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Terminal color mode (`--color`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Always,
    Never,
    Auto,
}

impl ColorMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Auto => "auto",
        }
    }
}

/// A value in the open-ended `-c key=value` override map.
///
/// Tables flatten into dotted keys; arrays are sent as a single JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Table(BTreeMap<String, ConfigValue>),
}

impl fmt::Display for ConfigValue {
    /// Render a leaf value the way it appears after `key=`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Array(_) | Self::Table(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(table: BTreeMap<String, ConfigValue>) -> Self {
        Self::Table(table)
    }
}

/// One layer of provider settings.
///
/// Three layers exist: provider defaults, model-constructor settings and
/// per-call overrides. Every field is optional so that an absent value falls
/// through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Executable to run instead of `codex` on `PATH`.
    pub codex_path: Option<PathBuf>,
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Extra writable directories (`--add-dir`).
    pub add_dirs: Option<Vec<PathBuf>>,
    pub approval_mode: Option<ApprovalMode>,
    pub sandbox_mode: Option<SandboxMode>,
    /// Use the CLI's `--full-auto` convenience flag.
    pub full_auto: Option<bool>,
    /// Disable every approval and sandbox check.
    pub dangerously_bypass_approvals_and_sandbox: Option<bool>,
    /// Defaults to `true` when unset.
    pub skip_git_repo_check: Option<bool>,
    pub color: Option<ColorMode>,
    /// Caller-owned sidecar path. Survives the request.
    pub output_last_message_file: Option<PathBuf>,
    /// Environment overrides layered over the inherited environment.
    pub env: Option<BTreeMap<String, String>>,
    /// Log request lifecycle at `info` instead of `debug`.
    pub verbose: Option<bool>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub reasoning_summary: Option<ReasoningSummary>,
    pub reasoning_summary_format: Option<ReasoningSummaryFormat>,
    pub model_verbosity: Option<ModelVerbosity>,
    pub include_plan_tool: Option<bool>,
    pub profile: Option<String>,
    pub oss: Option<bool>,
    pub web_search: Option<bool>,
    /// Generic `-c key=value` overrides.
    pub config_overrides: Option<BTreeMap<String, ConfigValue>>,
}

impl Settings {
    /// Layer `higher` over `self`.
    ///
    /// Scalars from `higher` win when present. `env` and `config_overrides`
    /// merge key by key so a higher layer can add or replace single entries.
    #[must_use]
    pub fn merge(&self, higher: &Settings) -> Settings {
        Settings {
            codex_path: pick(&higher.codex_path, &self.codex_path),
            cwd: pick(&higher.cwd, &self.cwd),
            add_dirs: pick(&higher.add_dirs, &self.add_dirs),
            approval_mode: higher.approval_mode.or(self.approval_mode),
            sandbox_mode: higher.sandbox_mode.or(self.sandbox_mode),
            full_auto: higher.full_auto.or(self.full_auto),
            dangerously_bypass_approvals_and_sandbox: higher
                .dangerously_bypass_approvals_and_sandbox
                .or(self.dangerously_bypass_approvals_and_sandbox),
            skip_git_repo_check: higher.skip_git_repo_check.or(self.skip_git_repo_check),
            color: higher.color.or(self.color),
            output_last_message_file: pick(
                &higher.output_last_message_file,
                &self.output_last_message_file,
            ),
            env: merge_maps(self.env.as_ref(), higher.env.as_ref()),
            verbose: higher.verbose.or(self.verbose),
            reasoning_effort: higher.reasoning_effort.or(self.reasoning_effort),
            reasoning_summary: higher.reasoning_summary.or(self.reasoning_summary),
            reasoning_summary_format: higher
                .reasoning_summary_format
                .or(self.reasoning_summary_format),
            model_verbosity: higher.model_verbosity.or(self.model_verbosity),
            include_plan_tool: higher.include_plan_tool.or(self.include_plan_tool),
            profile: pick(&higher.profile, &self.profile),
            oss: higher.oss.or(self.oss),
            web_search: higher.web_search.or(self.web_search),
            config_overrides: merge_maps(
                self.config_overrides.as_ref(),
                higher.config_overrides.as_ref(),
            ),
        }
    }

    /// Whether lifecycle logs should be raised to `info`.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    /// Set a single config override, creating the map if needed.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config_overrides
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

fn pick<T: Clone>(higher: &Option<T>, lower: &Option<T>) -> Option<T> {
    higher.clone().or_else(|| lower.clone())
}

fn merge_maps<V: Clone>(
    lower: Option<&BTreeMap<String, V>>,
    higher: Option<&BTreeMap<String, V>>,
) -> Option<BTreeMap<String, V>> {
    match (lower, higher) {
        (None, None) => None,
        (Some(map), None) | (None, Some(map)) => Some(map.clone()),
        (Some(lower), Some(higher)) => {
            let mut merged = lower.clone();
            merged.extend(higher.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(merged)
        }
    }
}
