//! Domain types shared by every formflow crate.
//!
//! A submission is owned by the host; the pipeline only reads it. Forms carry
//! the field definitions needed for label mapping and attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Free-form configuration mapping. Insertion order is preserved.
pub type ConfigMap = serde_json::Map<String, Value>;

// =============================================================================
// Timestamp
// =============================================================================

/// Seconds since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Data captured by one completed form instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub form_handle: String,
    #[serde(default)]
    pub data: ConfigMap,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
}

impl Submission {
    pub fn new(form_handle: impl Into<String>, data: ConfigMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            form_handle: form_handle.into(),
            data,
            created_at: Timestamp::now(),
        }
    }

    /// Look up a field value by handle.
    pub fn get(&self, handle: &str) -> Option<&Value> {
        self.data.get(handle)
    }

    /// Look up a field value as a non-empty string.
    pub fn get_str(&self, handle: &str) -> Option<&str> {
        self.get(handle)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn has(&self, handle: &str) -> bool {
        self.data.contains_key(handle)
    }
}

// =============================================================================
// Form definition
// =============================================================================

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub key: String,
    pub label: String,
}

/// A field of the form blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub handle: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: Vec<FieldOption>,
}

fn default_field_type() -> String {
    "text".to_string()
}

impl FieldDefinition {
    pub fn new(handle: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            field_type: field_type.into(),
            display: None,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(key, label)| FieldOption {
                key: key.to_string(),
                label: label.to_string(),
            })
            .collect();
        self
    }

    /// Label for an option key, if the field defines one.
    pub fn option_label(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.label.as_str())
    }
}

/// Options may be written as a list of strings, a list of `{key, value|label}`
/// tables, or a `key -> label` table.
fn deserialize_options<'de, D>(deserializer: D) -> std::result::Result<Vec<FieldOption>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let options = match raw {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(FieldOption {
                    key: s.clone(),
                    label: s,
                }),
                Value::Object(map) => {
                    let key = map.get("key").and_then(Value::as_str)?.to_string();
                    let label = map
                        .get("value")
                        .or_else(|| map.get("label"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| key.clone());
                    Some(FieldOption { key, label })
                }
                _ => None,
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, label)| {
                let label = label.as_str().map(str::to_string).unwrap_or_else(|| key.clone());
                FieldOption { key, label }
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(options)
}

/// A named email configuration supplied by the host form (legacy multi-config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormEmailConfig {
    pub id: String,
    #[serde(flatten)]
    pub settings: ConfigMap,
}

/// The host form a submission belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
    pub handle: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Whether the host persists submissions of this form.
    #[serde(default = "default_store")]
    pub store: bool,
    #[serde(default)]
    pub email: Vec<FormEmailConfig>,
}

fn default_store() -> bool {
    true
}

impl Form {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            title: None,
            fields: Vec::new(),
            store: true,
            email: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, handle: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.handle == handle)
    }

    pub fn has_field_type(&self, field_type: &str) -> bool {
        self.fields.iter().any(|f| f.field_type == field_type)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.handle)
    }
}

// =============================================================================
// Request context
// =============================================================================

/// Request-scoped facts the host knows about the submitter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub session_id: Option<String>,
    pub locale: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
