//! Recipient parsing and `{{ placeholder }}` resolution.

use std::fmt;
use std::sync::OnceLock;

use formflow_core::config::MailSettings;
use formflow_core::ConfigMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("Invalid placeholder regex")
    })
}

/// Whether the whole value is a single `{{ … }}` placeholder.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with("{{") && trimmed.ends_with("}}")
}

/// Replace `{{ key }}` and `{{ config.key }}` with values from the merged
/// action config, then from the installation mail settings. Unknown keys
/// render as empty strings.
pub fn resolve_placeholders(text: &str, config: &ConfigMap, settings: &MailSettings) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    placeholder_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            lookup(&caps[1], config, settings).unwrap_or_default()
        })
        .into_owned()
}

fn lookup(path: &str, config: &ConfigMap, settings: &MailSettings) -> Option<String> {
    let key = path.strip_prefix("config.").unwrap_or(path);

    if let Some(value) = lookup_path(config, key) {
        return Some(value);
    }

    match key {
        "from_address" | "mail.from_address" | "mail.from.address" => settings.from_address.clone(),
        "from_name" | "mail.from_name" | "mail.from.name" => settings.from_name.clone(),
        _ => None,
    }
}

fn lookup_path(config: &ConfigMap, path: &str) -> Option<String> {
    if let Some(value) = config.get(path) {
        return scalar(value);
    }
    let mut segments = path.split('.');
    let mut current = config.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    scalar(current)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split a recipient value into trimmed, resolved, non-empty addresses.
///
/// Accepts a comma-separated string or a list of strings.
pub fn parse_recipients(value: &Value, config: &ConfigMap, settings: &MailSettings) -> Vec<String> {
    let raw: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        other => {
            tracing::warn!(value = %other, "Unsupported recipient value");
            Vec::new()
        }
    };
    raw.into_iter()
        .map(|r| resolve_placeholders(r.trim(), config, settings).trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

/// Raw (unresolved) recipient entries, used for validation before sending.
pub fn raw_recipients(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> MailSettings {
        MailSettings {
            from_address: Some("noreply@example.com".to_string()),
            from_name: Some("Example".to_string()),
        }
    }

    fn config(value: Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_mailbox_display() {
        assert_eq!(Mailbox::new("a@b.com").to_string(), "a@b.com");
        assert_eq!(
            Mailbox::new("a@b.com")
                .with_name(Some("Ann".to_string()))
                .to_string(),
            "Ann <a@b.com>"
        );
        assert_eq!(Mailbox::new("a@b.com").with_name(Some("  ".to_string())).name, None);
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder("{{ config.admin_email }}"));
        assert!(is_placeholder(" {{x}} "));
        assert!(!is_placeholder("admin@example.com"));
    }

    #[test]
    fn test_resolve_from_config_then_settings() {
        let cfg = config(json!({"admin_email": "ops@example.com", "site": {"name": "Shop"}}));
        assert_eq!(
            resolve_placeholders("{{ config.admin_email }}", &cfg, &settings()),
            "ops@example.com"
        );
        assert_eq!(
            resolve_placeholders("Hi from {{ site.name }}", &cfg, &settings()),
            "Hi from Shop"
        );
        assert_eq!(
            resolve_placeholders("{{ mail.from.address }}", &cfg, &settings()),
            "noreply@example.com"
        );
        assert_eq!(resolve_placeholders("{{ missing }}", &cfg, &settings()), "");
    }

    #[test]
    fn test_parse_recipients_string_and_list() {
        let cfg = config(json!({"boss": "boss@example.com"}));
        assert_eq!(
            parse_recipients(&json!(" a@x.com , ,b@x.com,{{ boss }}"), &cfg, &settings()),
            vec!["a@x.com", "b@x.com", "boss@example.com"]
        );
        assert_eq!(
            parse_recipients(&json!(["a@x.com", 5, " b@x.com "]), &cfg, &settings()),
            vec!["a@x.com", "b@x.com"]
        );
        assert!(parse_recipients(&json!(true), &cfg, &settings()).is_empty());
    }

    #[test]
    fn test_unresolved_placeholder_is_dropped() {
        let cfg = ConfigMap::new();
        assert!(parse_recipients(&json!("{{ nobody }}"), &cfg, &settings()).is_empty());
    }

    #[test]
    fn test_raw_recipients() {
        assert_eq!(
            raw_recipients(&json!("a@x.com, {{ boss }}")),
            vec!["a@x.com", "{{ boss }}"]
        );
        assert!(raw_recipients(&json!(null)).is_empty());
    }
}
