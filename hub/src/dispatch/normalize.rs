//! Result normalization into the canonical tool result shape.
//!
//! Upstream servers return a variety of shapes; everything is rewritten into
//! `{ content: [{type, text}...], isError: bool }`:
//!
//! - already-canonical results are forwarded as-is
//! - objects with a non-empty `error` field become an error result
//! - plain objects become one pretty-printed text item
//! - scalars are stringified; `null` becomes the literal `"null"`

use serde_json::Value;

use crate::types::{ToolContent, ToolResult};

pub fn normalize(value: Value) -> ToolResult {
    match value {
        Value::Object(map) => {
            if let Some(content) = map.get("content").and_then(Value::as_array) {
                let is_error = map
                    .get("isError")
                    .or_else(|| map.get("is_error"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                return ToolResult {
                    content: content.iter().map(content_item).collect(),
                    is_error,
                };
            }

            if let Some(error) = map.get("error") {
                if !is_empty_error(error) {
                    return ToolResult::error(format!("Error: {}", format_error(error)));
                }
            }

            let object = Value::Object(map);
            ToolResult::text(
                serde_json::to_string_pretty(&object).unwrap_or_else(|_| object.to_string()),
            )
        }
        Value::String(s) => ToolResult::text(s),
        Value::Bool(b) => ToolResult::text(b.to_string()),
        Value::Number(n) => ToolResult::text(n.to_string()),
        Value::Null => ToolResult::text("null"),
        array @ Value::Array(_) => ToolResult::text(
            serde_json::to_string_pretty(&array).unwrap_or_else(|_| array.to_string()),
        ),
    }
}

fn content_item(item: &Value) -> ToolContent {
    if let Some(text) = item
        .as_object()
        .filter(|o| o.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|o| o.get("text"))
        .and_then(Value::as_str)
    {
        return ToolContent::text(text);
    }
    // Non-text items are carried as their JSON form.
    ToolContent::text(item.to_string())
}

fn is_empty_error(error: &Value) -> bool {
    match error {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn format_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_canonical_result_forwarded() {
        let result = normalize(json!({
            "content": [{"type": "text", "text": "7"}],
            "isError": false
        }));
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "7");
    }

    #[test]
    fn test_canonical_error_flag_preserved() {
        let result = normalize(json!({
            "content": [{"type": "text", "text": "bad"}],
            "isError": true
        }));
        assert!(result.is_error);
    }

    #[test]
    fn test_error_field_becomes_error_result() {
        let result = normalize(json!({"error": "upstream exploded"}));
        assert!(result.is_error);
        assert_eq!(result.text_content(), "Error: upstream exploded");

        let structured = normalize(json!({"error": {"code": 500}}));
        assert!(structured.is_error);
        assert!(structured.text_content().contains("500"));
    }

    #[test]
    fn test_empty_error_field_is_not_an_error() {
        let result = normalize(json!({"error": null, "value": 1}));
        assert!(!result.is_error);
        assert!(result.text_content().contains("\"value\": 1"));
    }

    #[test]
    fn test_plain_object_pretty_printed() {
        let result = normalize(json!({"sum": 7}));
        assert!(!result.is_error);
        assert!(result.text_content().contains("\"sum\": 7"));
    }

    #[test]
    fn test_scalars_stringified() {
        assert_eq!(normalize(json!("hi")).text_content(), "hi");
        assert_eq!(normalize(json!(7)).text_content(), "7");
        assert_eq!(normalize(json!(true)).text_content(), "true");
        assert_eq!(normalize(Value::Null).text_content(), "null");
    }

    #[test]
    fn test_non_text_content_items_carried_as_json() {
        let result = normalize(json!({
            "content": [{"type": "image", "data": "abc"}],
            "isError": false
        }));
        assert!(result.text_content().contains("image"));
    }
}
