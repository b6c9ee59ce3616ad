use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{FormflowError, Result};
use crate::types::ConfigMap;

/// Environment variable overriding `consent.public_key`.
pub const ENV_CONSENT_API_KEY: &str = "FORMFLOW_CONSENT_API_KEY";
/// Environment variable overriding `consent.base_uri`.
pub const ENV_CONSENT_BASE_URI: &str = "FORMFLOW_CONSENT_BASE_URI";

/// Top-level configuration for formflow.
///
/// Loaded from `formflow.toml` by default. `email` holds the global email
/// defaults every action config is layered on; `handlers` holds one block per
/// form handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormflowConfig {
    /// Suppress the host's built-in email delivery for every form.
    pub disable_default_email: bool,
    pub logging: LoggingConfig,
    pub email: ConfigMap,
    pub mail: MailSettings,
    pub consent: ConsentConfig,
    /// Translation key -> translated string, used for subjects and labels.
    pub translations: BTreeMap<String, String>,
    pub handlers: BTreeMap<String, HandlerConfig>,
}

impl Default for FormflowConfig {
    fn default() -> Self {
        Self {
            disable_default_email: true,
            logging: LoggingConfig::default(),
            email: default_email_settings(),
            mail: MailSettings::default(),
            consent: ConsentConfig::default(),
            translations: BTreeMap::new(),
            handlers: BTreeMap::new(),
        }
    }
}

fn default_email_settings() -> ConfigMap {
    let mut email = ConfigMap::new();
    email.insert("organization_name".into(), Value::from("Formflow"));
    email.insert("sanitize_content".into(), Value::Bool(true));
    email.insert(
        "exclude_fields".into(),
        Value::from(vec!["form", "site", "privacy", "consent"]),
    );
    email
}

impl FormflowConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FormflowConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FormflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `FORMFLOW_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_CONSENT_API_KEY).filter(|k| !k.is_empty()) {
            self.consent.public_key = Some(key);
        }
        if let Some(uri) = lookup(ENV_CONSENT_BASE_URI).filter(|u| !u.is_empty()) {
            self.consent.base_uri = uri;
        }
    }

    /// Handler block for a form handle.
    pub fn handler(&self, form_handle: &str) -> Option<&HandlerConfig> {
        self.handlers.get(form_handle)
    }

    /// Whether the host's own email delivery should be suppressed for a form.
    /// The handler setting wins over the global one.
    pub fn disables_default_email(&self, form_handle: &str) -> bool {
        self.handler(form_handle)
            .and_then(|h| h.disable_default_email)
            .unwrap_or(self.disable_default_email)
    }

    /// Global email defaults overridden by the handler's own settings.
    pub fn handler_base_config(&self, form_handle: &str) -> ConfigMap {
        match self.handler(form_handle) {
            Some(handler) => merge_layers([&self.email, &handler.settings]),
            None => self.email.clone(),
        }
    }

    /// The consent vendor API key, if one is configured.
    pub fn consent_api_key(&self) -> Option<&str> {
        self.consent
            .public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Shallow-merge configuration layers in order. Later layers win on key
/// collision; nested tables are replaced, not merged.
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a ConfigMap>) -> ConfigMap {
    let mut merged = ConfigMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Logging behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log successful actions at info level.
    pub enabled: bool,
    /// Default log level: trace, debug, info, warn, error.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Installation-wide sender identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub from_address: Option<String>,
    pub from_name: Option<String>,
}

/// Consent vendor credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub public_key: Option<String>,
    pub base_uri: String,
    pub timeout_secs: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            base_uri: "https://consent.iubenda.com/".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Per-form handler block.
///
/// Keys other than `disable_default_email`, `rate_limit` and `actions` are
/// handler-level overrides of the global email defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_default_email: Option<bool>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Action id -> action config, in declaration order.
    #[serde(default)]
    pub actions: ConfigMap,
    #[serde(flatten)]
    pub settings: ConfigMap,
}

/// One configured action of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEntry {
    pub id: String,
    pub config: ConfigMap,
}

impl HandlerConfig {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Configured actions in declaration order.
    ///
    /// A bare boolean (`autoresponder = false`) is shorthand for `enabled`.
    pub fn action_entries(&self) -> Vec<ActionEntry> {
        self.actions
            .iter()
            .map(|(id, value)| {
                let config = match value {
                    Value::Object(map) => map.clone(),
                    Value::Bool(enabled) => {
                        let mut map = ConfigMap::new();
                        map.insert("enabled".into(), Value::Bool(*enabled));
                        map
                    }
                    other => {
                        warn!(action = %id, value = %other, "Ignoring non-table action config");
                        ConfigMap::new()
                    }
                };
                ActionEntry {
                    id: id.clone(),
                    config,
                }
            })
            .collect()
    }
}

/// Which submitter attribute the rate limit is keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBy {
    #[default]
    Ip,
    Email,
    Session,
}

impl fmt::Display for RateLimitBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitBy::Ip => write!(f, "ip"),
            RateLimitBy::Email => write!(f, "email"),
            RateLimitBy::Session => write!(f, "session"),
        }
    }
}

/// Submission throttling for one form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub decay_minutes: u64,
    pub by: RateLimitBy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 5,
            decay_minutes: 60,
            by: RateLimitBy::Ip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
disable_default_email = false

[logging]
enabled = false
level = "debug"

[email]
organization_name = "Acme"
exclude_fields = ["privacy"]

[consent]
public_key = "pk_test"

[handlers.contact]
organization_name = "Acme Support"
disable_default_email = true

[handlers.contact.rate_limit]
enabled = true
max_attempts = 1
by = "email"

[handlers.contact.actions.autoresponder]
subject = "Thanks!"

[handlers.contact.actions.admin_notification]
to = "team@acme.test"
priority = 10

[handlers.contact.actions.consent_registration]
enabled = false
"#;

    fn map(value: serde_json::Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = FormflowConfig::default();
        assert!(config.disable_default_email);
        assert!(config.logging.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.email.get("sanitize_content"), Some(&json!(true)));
        assert_eq!(config.consent.base_uri, "https://consent.iubenda.com/");
        assert!(config.consent_api_key().is_none());
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config: FormflowConfig = toml::from_str(SAMPLE).unwrap();
        assert!(!config.disable_default_email);
        assert!(!config.logging.enabled);
        assert_eq!(config.consent_api_key(), Some("pk_test"));

        let handler = config.handler("contact").unwrap();
        assert_eq!(handler.disable_default_email, Some(true));
        assert!(handler.rate_limit.enabled);
        assert_eq!(handler.rate_limit.max_attempts, 1);
        assert_eq!(handler.rate_limit.decay_minutes, 60);
        assert_eq!(handler.rate_limit.by, RateLimitBy::Email);
        assert_eq!(
            handler.settings.get("organization_name"),
            Some(&json!("Acme Support"))
        );
        assert!(!handler.settings.contains_key("actions"));
        assert!(!handler.settings.contains_key("rate_limit"));
    }

    #[test]
    fn test_action_entries_preserve_declaration_order() {
        let config: FormflowConfig = toml::from_str(SAMPLE).unwrap();
        let ids: Vec<String> = config
            .handler("contact")
            .unwrap()
            .action_entries()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(
            ids,
            vec!["autoresponder", "admin_notification", "consent_registration"]
        );
    }

    #[test]
    fn test_action_entry_bool_shorthand() {
        let handler = HandlerConfig {
            actions: map(json!({"autoresponder": false, "admin_notification": true, "bogus": 3})),
            ..HandlerConfig::default()
        };
        let entries = handler.action_entries();
        assert_eq!(entries[0].config.get("enabled"), Some(&json!(false)));
        assert_eq!(entries[1].config.get("enabled"), Some(&json!(true)));
        assert!(entries[2].config.is_empty());
    }

    #[test]
    fn test_disables_default_email_precedence() {
        let config: FormflowConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.disables_default_email("contact"));
        assert!(!config.disables_default_email("newsletter"));
    }

    #[test]
    fn test_handler_base_config_layers_handler_over_global() {
        let config: FormflowConfig = toml::from_str(SAMPLE).unwrap();
        let base = config.handler_base_config("contact");
        assert_eq!(base.get("organization_name"), Some(&json!("Acme Support")));
        assert_eq!(base.get("exclude_fields"), Some(&json!(["privacy"])));
        assert!(!base.contains_key("actions"));

        let fallback = config.handler_base_config("unknown");
        assert_eq!(fallback.get("organization_name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_merge_layers_later_wins() {
        let global = map(json!({"subject": "global", "logo_url": "a.png", "sanitize_content": true}));
        let handler = map(json!({"subject": "handler", "to": "h@x.io"}));
        let action = map(json!({"subject": "action", "enabled": true}));
        let merged = merge_layers([&global, &handler, &action]);
        assert_eq!(merged.get("subject"), Some(&json!("action")));
        assert_eq!(merged.get("to"), Some(&json!("h@x.io")));
        assert_eq!(merged.get("logo_url"), Some(&json!("a.png")));
        assert_eq!(merged.get("enabled"), Some(&json!(true)));
    }

    #[test]
    fn test_merge_layers_replaces_nested_tables() {
        let a = map(json!({"when": {"field": "a", "value": 1}}));
        let b = map(json!({"when": {"field": "b"}}));
        let merged = merge_layers([&a, &b]);
        assert_eq!(merged.get("when"), Some(&json!({"field": "b"})));
    }

    #[test]
    fn test_merge_layers_empty() {
        assert!(merge_layers(std::iter::empty::<&ConfigMap>()).is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FormflowConfig::default();
        config.apply_overrides_from(|key| match key {
            ENV_CONSENT_API_KEY => Some("from-env".to_string()),
            ENV_CONSENT_BASE_URI => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.consent_api_key(), Some("from-env"));
        assert_eq!(config.consent.base_uri, "https://consent.iubenda.com/");
    }

    #[test]
    fn test_blank_api_key_is_not_configured() {
        let mut config = FormflowConfig::default();
        config.consent.public_key = Some("   ".to_string());
        assert!(config.consent_api_key().is_none());
    }

    #[test]
    fn test_rate_limit_by_display() {
        assert_eq!(RateLimitBy::Ip.to_string(), "ip");
        assert_eq!(RateLimitBy::Email.to_string(), "email");
        assert_eq!(RateLimitBy::Session.to_string(), "session");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("formflow.toml");

        let mut config: FormflowConfig = toml::from_str(SAMPLE).unwrap();
        config.translations.insert("thanks".into(), "Danke".into());
        config.save(&path).unwrap();

        let loaded = FormflowConfig::load(&path).unwrap();
        assert_eq!(loaded.consent_api_key(), Some("pk_test"));
        assert_eq!(loaded.translations.get("thanks").map(String::as_str), Some("Danke"));
        let handler = loaded.handler("contact").unwrap();
        assert_eq!(handler.action_entries().len(), 3);
        assert_eq!(handler.rate_limit.by, RateLimitBy::Email);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FormflowConfig::load_or_default(&dir.path().join("absent.toml"));
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "handlers = [[[").unwrap();
        let err = FormflowConfig::load(&path).unwrap_err();
        assert!(matches!(err, FormflowError::Config(_)));
    }
}
