//! Consent registration action.
//!
//! Records the submitter's consent with the external registry. Runs last
//! (priority 90) and has nothing to preview.

use std::sync::Arc;

use async_trait::async_trait;
use formflow_core::{ConfigMap, FormflowConfig};
use serde_json::Value;

use crate::consent::{legal_notices_from_config, ConsentRegistry, ConsentRequest};
use crate::error::ActionError;
use crate::handler::{ActionContext, ActionDescriptor, FormAction};
use crate::result::ActionResult;

pub const ID: &str = "consent_registration";

/// Maps consent subject fields to submission handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            first_name: Some("first_name".to_string()),
            last_name: Some("last_name".to_string()),
            email: "email".to_string(),
        }
    }
}

impl FieldMapping {
    /// Overlay `field_mapping` from the config on the defaults. An explicit
    /// `null` clears a name mapping.
    pub fn from_config(config: &ConfigMap) -> Self {
        let mut mapping = Self::default();
        let Some(overrides) = config.get("field_mapping").and_then(Value::as_object) else {
            return mapping;
        };
        let handle = |v: &Value| v.as_str().map(str::to_string);
        if let Some(v) = overrides.get("first_name") {
            mapping.first_name = handle(v);
        }
        if let Some(v) = overrides.get("last_name") {
            mapping.last_name = handle(v);
        }
        if let Some(email) = overrides.get("email").and_then(Value::as_str) {
            mapping.email = email.to_string();
        }
        mapping
    }
}

/// Splits `"Jane van Doe"` into `("Jane", "van Doe")`.
fn split_full_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Registers consent for the submitter.
pub struct ConsentRegistrationAction {
    config: Arc<FormflowConfig>,
    registry: Arc<dyn ConsentRegistry>,
}

impl ConsentRegistrationAction {
    pub fn new(config: Arc<FormflowConfig>, registry: Arc<dyn ConsentRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(ID, |services| {
            Ok(Arc::new(Self::new(
                Arc::clone(&services.config),
                Arc::clone(&services.consent),
            )) as Arc<dyn FormAction>)
        })
        .previewable(false)
        .with_config_fields(&[
            "field_mapping",
            "preferences",
            "legal_notices",
            "privacy_policy",
            "cookie_policy",
        ])
    }
}

#[async_trait]
impl FormAction for ConsentRegistrationAction {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i64 {
        90
    }

    /// Requires the registry API key.
    fn validate(&self, _config: &ConfigMap) -> bool {
        self.config.consent_api_key().is_some()
    }

    async fn handle(&self, ctx: &ActionContext, config: &ConfigMap) -> Result<ActionResult, ActionError> {
        let mapping = FieldMapping::from_config(config);
        let submission = &ctx.submission;

        let mut first_name = mapping
            .first_name
            .as_deref()
            .and_then(|h| submission.get_str(h))
            .map(str::to_string);
        let mut last_name = mapping
            .last_name
            .as_deref()
            .and_then(|h| submission.get_str(h))
            .map(str::to_string);

        // Without a last-name mapping the first-name field (or `name`) holds
        // the full name.
        if mapping.last_name.is_none() {
            let full = first_name
                .take()
                .or_else(|| submission.get_str("name").map(str::to_string));
            if let Some(full) = full {
                let (first, last) = split_full_name(&full);
                first_name = Some(first);
                last_name = Some(last);
            }
        }

        let Some(email) = submission.get_str(&mapping.email) else {
            return Ok(ActionResult::failure_with_message(
                vec!["Email is required for consent registration".to_string()],
                "Consent registration failed: no email",
            ));
        };

        let preferences = config
            .get("preferences")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let request = ConsentRequest::new()
            .first_name(first_name.as_deref().unwrap_or_default())
            .last_name(last_name.as_deref())
            .email(email)
            .preferences(preferences)
            .legal_notices(legal_notices_from_config(config));

        let response = self.registry.create_consent(&request).await?;
        Ok(ActionResult::success_with_data(
            response,
            "Consent registered successfully",
        ))
    }
}
