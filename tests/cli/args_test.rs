//! Tests for argument building.

use std::collections::BTreeMap;

use codex_cli_provider::cli::{build_invocation, flatten_config_overrides};
use codex_cli_provider::config::{ApprovalMode, ConfigValue, SandboxMode, Settings};
use serde_json::json;

fn has_policy_overrides(args: &[String]) -> bool {
    args.iter()
        .any(|a| a.starts_with("approval_policy=") || a.starts_with("sandbox_mode="))
}

#[test]
fn autonomy_flags_exclude_policy_overrides() {
    let combos = [
        (Some(true), None, "--full-auto"),
        (None, Some(true), "--dangerously-bypass-approvals-and-sandbox"),
    ];
    for (full_auto, bypass, flag) in combos {
        let settings = Settings {
            full_auto,
            dangerously_bypass_approvals_and_sandbox: bypass,
            approval_mode: Some(ApprovalMode::Never),
            sandbox_mode: Some(SandboxMode::ReadOnly),
            ..Settings::default()
        };
        let invocation = build_invocation("p", None, &settings, "m").unwrap();
        assert!(invocation.args.contains(&flag.to_string()));
        assert!(!has_policy_overrides(&invocation.args));
    }

    let invocation = build_invocation("p", None, &Settings::default(), "m").unwrap();
    assert!(has_policy_overrides(&invocation.args));
    assert!(!invocation.args.iter().any(|a| a == "--full-auto"));
    assert!(!invocation
        .args
        .iter()
        .any(|a| a == "--dangerously-bypass-approvals-and-sandbox"));
}

#[test]
fn nested_overrides_flatten() {
    let mut overrides = BTreeMap::new();
    let mut b = BTreeMap::new();
    let mut c = BTreeMap::new();
    c.insert("c".to_string(), ConfigValue::Bool(true));
    b.insert("b".to_string(), ConfigValue::Table(c));
    overrides.insert("a".to_string(), ConfigValue::Table(b));
    overrides.insert(
        "arr".to_string(),
        ConfigValue::Array(vec![ConfigValue::Integer(1), ConfigValue::Integer(2)]),
    );
    overrides.insert("empty".to_string(), ConfigValue::Array(vec![]));

    let flat = flatten_config_overrides(&overrides);
    assert_eq!(
        flat,
        vec![
            ("a.b.c".to_string(), "true".to_string()),
            ("arr".to_string(), "[1,2]".to_string()),
            ("empty".to_string(), "[]".to_string()),
        ]
    );
}

#[test]
fn prompt_precedes_sidecar_flag() {
    let invocation = build_invocation("Explain this", None, &Settings::default(), "gpt-5").unwrap();
    let args = &invocation.args;
    let prompt_pos = args.iter().position(|a| a == "Explain this").unwrap();
    assert_eq!(args[prompt_pos + 1], "--output-last-message");
    assert_eq!(invocation.flag_value("-m"), Some("gpt-5"));
    assert!(invocation.owns_last_message_file());
}

#[test]
fn schema_without_properties_is_not_passed() {
    let invocation = build_invocation(
        "p",
        Some(&json!({"type": "object"})),
        &Settings::default(),
        "m",
    )
    .unwrap();
    assert!(invocation.schema_path.is_none());
    assert!(invocation.flag_value("--output-schema").is_none());
}

#[test]
fn dropping_invocation_removes_temp_dirs() {
    let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
    let invocation = build_invocation("p", Some(&schema), &Settings::default(), "m").unwrap();
    let schema_dir = invocation.schema_path.clone().unwrap().parent().unwrap().to_path_buf();
    let sidecar_dir = invocation.last_message_path.parent().unwrap().to_path_buf();
    assert!(schema_dir.exists());
    assert!(sidecar_dir.exists());

    drop(invocation);
    assert!(!schema_dir.exists());
    assert!(!sidecar_dir.exists());
}
