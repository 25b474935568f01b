//! Provider error taxonomy.

use std::sync::LazyLock;

use regex::Regex;

/// Characters of the prompt kept in error diagnostics.
pub const PROMPT_EXCERPT_CHARS: usize = 200;

static AUTH_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)login|auth|unauthorized|not\s+logged").ok());

/// Errors surfaced to callers of the language model.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// Settings or model id rejected before anything was spawned.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// The CLI is not logged in or credentials were rejected.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The CLI failed: nonzero exit, a failure event, or a spawn error.
    #[error("Codex CLI call failed: {message}")]
    ApiCall {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
        prompt_excerpt: String,
    },

    /// The caller aborted the request.
    #[error("Request aborted: {reason}")]
    Aborted { reason: String },

    /// Local I/O failure while preparing the request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema or payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProviderError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn api_call(
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
        prompt: &str,
    ) -> Self {
        Self::ApiCall {
            message: message.into(),
            exit_code,
            stderr: stderr.into(),
            prompt_excerpt: prompt_excerpt(prompt),
        }
    }

    /// Nothing in this crate retries; the answer is always `false`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Exit code of the failed process, if known.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ApiCall { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Whether this error asks the caller to log in again.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

/// First [`PROMPT_EXCERPT_CHARS`] characters of the prompt.
#[must_use]
pub fn prompt_excerpt(prompt: &str) -> String {
    prompt.chars().take(PROMPT_EXCERPT_CHARS).collect()
}

/// Whether a message looks like a login or credential problem.
#[must_use]
pub fn looks_like_auth_failure(message: &str) -> bool {
    AUTH_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(message))
}

/// Classify a spawn failure.
///
/// This is the only place that pattern-matches error text.
#[must_use]
pub fn classify_spawn_error(err: &std::io::Error, prompt: &str) -> ProviderError {
    let message = match err.kind() {
        std::io::ErrorKind::NotFound => format!("Codex binary not found: {err}"),
        std::io::ErrorKind::PermissionDenied => format!("Permission denied spawning Codex: {err}"),
        _ => err.to_string(),
    };
    if looks_like_auth_failure(&message) {
        return ProviderError::Authentication { message };
    }
    ProviderError::api_call(message, None, String::new(), prompt)
}
