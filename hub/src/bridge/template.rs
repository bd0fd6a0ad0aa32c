//! Request template substitution.
//!
//! Templates may reference call arguments as `{{data.path}}` and process
//! environment variables as `{{env.NAME}}`. Unresolved variables render as
//! empty strings rather than failing the call; callers that want stricter
//! behavior validate arguments against the tool schema first.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").expect("static var pattern")
    })
}

/// Resolve one `data.*` / `env.*` reference. `None` when undefined.
fn resolve(reference: &str, args: &Value) -> Option<Value> {
    if let Some(path) = reference.strip_prefix("data.") {
        return lookup_path(args, path).cloned();
    }
    if let Some(name) = reference.strip_prefix("env.") {
        return std::env::var(name).ok().map(Value::String);
    }
    None
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every reference in a string template.
pub fn render_str(template: &str, args: &Value) -> String {
    var_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            resolve(&caps[1], args)
                .map(|v| stringify(&v))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Substitute recursively through a JSON template.
///
/// A string consisting of exactly one reference is replaced by the resolved
/// JSON value, preserving its type; any other string is interpolated.
pub fn render_value(template: &Value, args: &Value) -> Value {
    match template {
        Value::String(s) => {
            if let Some(caps) = var_pattern().captures(s) {
                if caps.get(0).map(|m| m.as_str()) == Some(s.as_str()) {
                    return resolve(&caps[1], args).unwrap_or(Value::String(String::new()));
                }
            }
            Value::String(render_str(s, args))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, args)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, args)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_render_str_substitutes_data_paths() {
        let args = json!({"city": "Berlin", "units": {"temp": "celsius"}});
        assert_eq!(
            render_str("https://api.example.com/{{data.city}}?u={{data.units.temp}}", &args),
            "https://api.example.com/Berlin?u=celsius"
        );
    }

    #[test]
    fn test_render_str_undefined_becomes_empty() {
        let args = json!({});
        assert_eq!(render_str("q={{data.missing}}", &args), "q=");
        assert_eq!(render_str("{{unprefixed}}", &args), "");
    }

    #[test]
    #[serial]
    fn test_render_str_reads_environment() {
        std::env::set_var("HUB_TEMPLATE_TEST_TOKEN", "s3cret");
        let rendered = render_str("Bearer {{env.HUB_TEMPLATE_TEST_TOKEN}}", &json!({}));
        assert_eq!(rendered, "Bearer s3cret");
        std::env::remove_var("HUB_TEMPLATE_TEST_TOKEN");
    }

    #[test]
    fn test_render_value_preserves_json_types_for_exact_references() {
        let args = json!({"count": 3, "tags": ["a", "b"], "nested": {"x": true}});
        let template = json!({
            "count": "{{data.count}}",
            "tags": "{{data.tags}}",
            "label": "n={{data.count}}",
            "nested": "{{data.nested}}"
        });
        let rendered = render_value(&template, &args);
        assert_eq!(rendered["count"], json!(3));
        assert_eq!(rendered["tags"], json!(["a", "b"]));
        assert_eq!(rendered["label"], json!("n=3"));
        assert_eq!(rendered["nested"], json!({"x": true}));
    }

    #[test]
    fn test_render_value_recurses_arrays_and_objects() {
        let args = json!({"name": "hub"});
        let template = json!([{"greeting": "hello {{data.name}}"}, "{{data.missing}}"]);
        let rendered = render_value(&template, &args);
        assert_eq!(rendered[0]["greeting"], "hello hub");
        assert_eq!(rendered[1], "");
    }
}
