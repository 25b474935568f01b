//! Settings validation.
//!
//! Validation never touches the subprocess. Errors block the request,
//! warnings are logged and otherwise ignored.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{ConfigValue, Settings};

/// Outcome of validating one settings layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Validate a (possibly merged) settings record.
#[must_use]
pub fn validate_settings(settings: &Settings) -> ValidationReport {
    let mut report = ValidationReport::default();

    let full_auto = settings.full_auto.unwrap_or(false);
    let bypass = settings
        .dangerously_bypass_approvals_and_sandbox
        .unwrap_or(false);

    if full_auto && bypass {
        report.errors.push(
            "full_auto and dangerously_bypass_approvals_and_sandbox are mutually exclusive"
                .to_string(),
        );
    }
    if bypass {
        report.warnings.push(
            "dangerously_bypass_approvals_and_sandbox disables every approval and sandbox check"
                .to_string(),
        );
    }
    if full_auto && settings.skip_git_repo_check == Some(false) {
        report
            .warnings
            .push("full_auto outside a git repository will fail the repo check".to_string());
    }

    if let Some(path) = &settings.codex_path {
        if path.as_os_str().is_empty() {
            report.errors.push("codex_path must not be empty".to_string());
        }
    }

    if let Some(cwd) = &settings.cwd {
        if !cwd.is_dir() {
            report
                .warnings
                .push(format!("cwd {} is not an existing directory", cwd.display()));
        }
    }

    if let Some(dirs) = &settings.add_dirs {
        if dirs.iter().any(|d| d.as_os_str().is_empty()) {
            report.errors.push("add_dirs entries must not be empty".to_string());
        }
    }

    if let Some(profile) = &settings.profile {
        if profile.trim().is_empty() {
            report.errors.push("profile must not be empty".to_string());
        }
    }

    if let Some(overrides) = &settings.config_overrides {
        check_override_keys(overrides, "", &mut report.errors);
    }

    report.finish()
}

fn check_override_keys(
    overrides: &BTreeMap<String, ConfigValue>,
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for (key, value) in overrides {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if key.trim().is_empty() {
            errors.push(format!("config override key under '{prefix}' is empty"));
        } else if key.contains('=') {
            errors.push(format!("config override key '{full}' must not contain '='"));
        }
        if let ConfigValue::Table(table) = value {
            check_override_keys(table, &full, errors);
        }
    }
}

/// Validate a model identifier.
///
/// # Errors
///
/// Returns a message when the identifier is empty or whitespace.
pub fn validate_model_id(model_id: &str) -> Result<(), String> {
    if model_id.trim().is_empty() {
        return Err("model id must be a non-empty string".to_string());
    }
    Ok(())
}
