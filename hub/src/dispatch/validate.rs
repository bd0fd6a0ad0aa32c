//! Argument validation against a tool's input schema.
//!
//! Supports the JSON-schema subset tools actually advertise: `type`,
//! `properties`, `required`, and `additionalProperties`. Validation failures
//! are never retried.

use serde_json::Value;

use crate::error::{HubError, HubResult};

/// Validate call arguments against a tool's input schema.
pub fn validate_args(schema: &Value, args: &Value) -> HubResult<()> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    let empty_args = serde_json::Map::new();
    let args_map = match args {
        Value::Object(map) => map,
        Value::Null => &empty_args,
        _ => {
            return Err(HubError::InvalidArguments(
                "Arguments must be an object".into(),
            ))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match args_map.get(name) {
                None | Some(Value::Null) => {
                    return Err(HubError::InvalidArguments(format!(
                        "Missing required argument: {name}"
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, value) in args_map {
            let Some(declared) = properties.get(name) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                continue;
            };
            if value.is_null() {
                // Optional null arguments pass; required nulls were caught above.
                continue;
            }
            if !type_matches(expected, value) {
                return Err(HubError::InvalidArguments(format!(
                    "Invalid type for argument '{name}': expected {expected}"
                )));
            }
        }
    }

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        for name in args_map.keys() {
            let declared = properties.map(|p| p.contains_key(name)).unwrap_or(false);
            if !declared {
                return Err(HubError::InvalidArguments(format!(
                    "Unexpected argument: {name}"
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown declared types are not enforced.
        _ => true,
    }
}
