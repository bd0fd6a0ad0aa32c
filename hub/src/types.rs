//! Shared tool types.
//!
//! [`ToolDescriptor`] is the hub's unified view of a tool regardless of origin
//! (upstream MCP server or the API-tool bridge). [`ToolResult`] is the
//! canonical call result shape every execution path normalizes into.

use serde::{Deserialize, Serialize};

/// A tool as advertised by its owning server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-schema-shaped: `type`, `properties`, `required`, `additionalProperties`.
    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
    /// Owning server id; `api-tools` for HTTP-bridged tools.
    pub server: String,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            ToolContent::Text { text } => text,
        }
    }
}

/// Canonical tool call result: `{ content: [...], isError: bool }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: true,
        }
    }

    /// Concatenated text of all content items.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(ToolContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_serializes_with_is_error_camel_case() {
        let result = ToolResult::error("boom");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "boom");
    }

    #[test]
    fn test_tool_descriptor_defaults_schema() {
        let descriptor: ToolDescriptor =
            serde_json::from_value(serde_json::json!({ "name": "add", "server": "math" })).unwrap();
        assert_eq!(descriptor.input_schema["type"], "object");
        assert!(descriptor.description.is_empty());
    }
}
