//! Markup stripping and HTML escaping for values rendered into mail bodies.

use std::sync::OnceLock;

use formflow_core::ConfigMap;
use regex::Regex;
use serde_json::Value;

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!/][^>]*>").expect("Invalid tag regex"))
}

/// Remove markup tags and comments.
pub fn strip_tags(input: &str) -> String {
    tag_pattern().replace_all(input, "").into_owned()
}

/// Escape `& < > " '` for safe HTML embedding.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

pub fn sanitize_str(input: &str) -> String {
    escape_html(&strip_tags(input))
}

/// Sanitize every string in a value tree. Non-string scalars are untouched.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other.clone(),
    }
}

pub fn sanitize_map(map: &ConfigMap) -> ConfigMap {
    map.iter()
        .map(|(k, v)| (k.clone(), sanitize_value(v)))
        .collect()
}
