//! Provider factory and the Codex-backed language model.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{validate_model_id, validate_settings, ConfigError, ConfigLoader, Settings};

use super::prompt::flatten_prompt;
use super::stream::StreamResponse;
use super::{generate, stream, CallOptions, CallWarning, GenerateResult, ProviderError};

/// Provider identifier reported by every model.
pub const PROVIDER_ID: &str = "codex-cli";

/// A text-generation model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider identifier.
    fn provider(&self) -> &str;

    /// Model identifier passed to the backend.
    fn model_id(&self) -> &str;

    /// Run a request to completion.
    async fn generate(&self, options: CallOptions) -> Result<GenerateResult, ProviderError>;

    /// Start a request and return its parts as a stream.
    async fn stream(&self, options: CallOptions) -> Result<StreamResponse, ProviderError>;
}

/// Creates [`CodexLanguageModel`]s sharing provider-default settings.
#[derive(Debug, Clone, Default)]
pub struct CodexProvider {
    default_settings: Settings,
}

impl CodexProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with explicit default settings.
    #[must_use]
    pub fn with_settings(default_settings: Settings) -> Self {
        Self { default_settings }
    }

    /// Provider whose defaults come from the first config file found.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn from_loader(loader: &ConfigLoader) -> Result<Self, ConfigError> {
        Ok(Self::with_settings(loader.load()?))
    }

    #[must_use]
    pub fn default_settings(&self) -> &Settings {
        &self.default_settings
    }

    /// Create a model, layering `settings` over the provider defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] for an empty model id or
    /// settings that fail validation.
    pub fn language_model(
        &self,
        model_id: impl Into<String>,
        settings: Settings,
    ) -> Result<CodexLanguageModel, ProviderError> {
        let model_id = model_id.into();
        validate_model_id(&model_id).map_err(ProviderError::configuration)?;
        let settings = checked(self.default_settings.merge(&settings))?;
        tracing::debug!(model_id = %model_id, "Created codex language model");
        Ok(CodexLanguageModel { model_id, settings })
    }
}

fn checked(settings: Settings) -> Result<Settings, ProviderError> {
    let report = validate_settings(&settings);
    for warning in &report.warnings {
        tracing::warn!(warning = %warning, "Codex settings warning");
    }
    if !report.valid {
        return Err(ProviderError::configuration(report.errors.join("; ")));
    }
    Ok(settings)
}

/// Everything a single request needs, resolved up front.
#[derive(Debug, Clone)]
pub(crate) struct PreparedCall {
    pub settings: Settings,
    pub prompt: String,
    pub warnings: Vec<CallWarning>,
    pub schema: Option<Value>,
}

/// A language model backed by `codex exec`.
#[derive(Debug, Clone)]
pub struct CodexLanguageModel {
    model_id: String,
    settings: Settings,
}

impl CodexLanguageModel {
    /// Effective constructor-level settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn prepare(&self, options: &CallOptions) -> Result<PreparedCall, ProviderError> {
        let settings = match &options.provider_options {
            Some(per_call) => checked(self.settings.merge(per_call))?,
            None => self.settings.clone(),
        };

        let (prompt, prompt_warnings) = flatten_prompt(&options.prompt);
        let mut warnings = options.unsupported_setting_warnings();
        warnings.extend(prompt_warnings);

        Ok(PreparedCall {
            settings,
            prompt,
            warnings,
            schema: options.output_schema().cloned(),
        })
    }
}

#[async_trait]
impl LanguageModel for CodexLanguageModel {
    fn provider(&self) -> &str {
        PROVIDER_ID
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, options: CallOptions) -> Result<GenerateResult, ProviderError> {
        let call = self.prepare(&options)?;
        generate::generate(&self.model_id, call, options.abort).await
    }

    async fn stream(&self, options: CallOptions) -> Result<StreamResponse, ProviderError> {
        let call = self.prepare(&options)?;
        stream::stream(self.model_id.clone(), call, options.abort)
    }
}
