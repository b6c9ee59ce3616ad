//! Typed reads of loosely-typed action config values.

use formflow_core::ConfigMap;
use serde_json::Value;

/// Loose boolean reading: `true`, non-zero numbers and
/// `"1"`/`"true"`/`"yes"`/`"on"` are true.
pub fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

/// `config[key]` as a boolean, `default` when absent or null.
pub fn flag(config: &ConfigMap, key: &str, default: bool) -> bool {
    match config.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => as_bool(value),
    }
}

/// A list of handles from a list or a comma-separated string.
pub fn handle_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::String(s) => Some(
            s.split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|h| !h.is_empty())
                .collect(),
        ),
        Value::Null => None,
        _ => Some(Vec::new()),
    }
}

/// Trimmed, non-empty string value.
pub fn non_blank(config: &ConfigMap, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer value, accepting numeric strings.
pub fn integer(config: &ConfigMap, key: &str) -> Option<i64> {
    match config.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
