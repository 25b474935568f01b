//! JSON Schema sanitizing for `--output-schema`.
//!
//! Strict structured-output mode rejects several keywords. They are stripped
//! recursively, except inside `properties`, where keys are user property
//! names and are kept as-is.

use serde_json::{Map, Value};

/// Keywords removed before the schema is handed to the CLI.
pub const UNSUPPORTED_SCHEMA_FIELDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "title",
    "examples",
    "default",
    "format",
    "pattern",
];

/// Recursively strip unsupported keywords.
#[must_use]
pub fn sanitize_schema(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if key == "properties" {
                    if let Value::Object(props) = val {
                        let props = props
                            .iter()
                            .map(|(name, schema)| (name.clone(), sanitize_schema(schema)))
                            .collect();
                        out.insert(key.clone(), Value::Object(props));
                        continue;
                    }
                }
                if UNSUPPORTED_SCHEMA_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), sanitize_schema(val));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Sanitize and close the schema for strict mode.
///
/// Returns `None` when the result has no properties, since an empty schema
/// is rejected by the model API.
#[must_use]
pub fn prepare_output_schema(schema: &Value) -> Option<Value> {
    let Value::Object(mut map) = sanitize_schema(schema) else {
        return None;
    };
    let has_properties = map
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());
    if !has_properties {
        return None;
    }
    map.insert("additionalProperties".to_string(), Value::Bool(false));
    Some(Value::Object(map))
}
