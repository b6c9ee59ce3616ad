//! Rendering sample emails for configured actions without sending them.

use formflow_core::config::merge_layers;
use formflow_core::{ConfigMap, Form, FormflowConfig, Submission};
use serde::Serialize;
use serde_json::Value;

use crate::error::ActionError;
use crate::handler::{is_disabled, ActionRegistry, ActionServices};
use crate::mail::MailMessage;
use crate::settings::non_blank;

const SAMPLE_EMAIL: &str = "preview@example.com";

/// A configured action that can render a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub id: String,
    pub name: String,
}

/// Enabled, registered, previewable actions of `form` in configuration order.
pub fn previewable_actions(
    config: &FormflowConfig,
    registry: &ActionRegistry,
    form: &Form,
) -> Vec<PreviewEntry> {
    let Some(handler) = config.handler(&form.handle) else {
        return Vec::new();
    };
    handler
        .action_entries()
        .into_iter()
        .filter(|entry| !is_disabled(&entry.config))
        .filter_map(|entry| {
            let descriptor = registry.get(&entry.id)?;
            descriptor.previewable.then(|| PreviewEntry {
                id: entry.id,
                name: descriptor.name.clone(),
            })
        })
        .collect()
}

/// Build the message `action_id` would send for a sample submission of `form`.
pub fn preview_message(
    services: &ActionServices,
    registry: &ActionRegistry,
    form: &Form,
    action_id: &str,
) -> Result<MailMessage, ActionError> {
    let descriptor = registry
        .get(action_id)
        .ok_or_else(|| ActionError::UnregisteredAction(action_id.to_string()))?;
    if !descriptor.previewable {
        return Err(ActionError::InvalidConfig(format!(
            "{} does not support previews",
            action_id
        )));
    }
    let action = descriptor.instantiate(services)?;
    let kind = action.mail_kind().ok_or_else(|| {
        ActionError::InvalidConfig(format!("{} does not send email", action_id))
    })?;

    let action_config = services
        .config
        .handler(&form.handle)
        .and_then(|handler| {
            handler
                .action_entries()
                .into_iter()
                .find(|entry| entry.id == action_id)
        })
        .map(|entry| entry.config)
        .unwrap_or_default();
    let base = services.config.handler_base_config(&form.handle);
    let config = merge_layers([&base, &action_config]);

    let submission = sample_submission(form, &config);
    services.mail_builder.build(kind, form, &submission, &config)
}

/// A submission with a placeholder value for every field of `form`.
pub fn sample_submission(form: &Form, config: &ConfigMap) -> Submission {
    let mut data = ConfigMap::new();
    for field in &form.fields {
        let first_option = field.options.first().map(|o| Value::from(o.key.as_str()));
        let value = match (field.field_type.as_str(), first_option) {
            ("checkboxes", Some(option)) => Value::Array(vec![option]),
            ("radio" | "select" | "button_group", Some(option)) => option,
            ("toggle", _) => Value::Bool(true),
            ("integer", _) => Value::from(42),
            _ if field.field_type == "email" || field.handle == "email" => Value::from(SAMPLE_EMAIL),
            _ => Value::from(format!("Sample {}", field.handle.replace(['_', '-'], " "))),
        };
        data.insert(field.handle.clone(), value);
    }

    let email_field = non_blank(config, "email_field").unwrap_or_else(|| "email".to_string());
    data.entry(email_field).or_insert_with(|| Value::from(SAMPLE_EMAIL));
    data.entry("name").or_insert_with(|| Value::from("Jane Doe"));

    Submission::new(form.handle.clone(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{ConsentRegistry, ConsentRequest};
    use crate::error::ConsentError;
    use crate::mail::{MailKind, MailTransport, MemoryTransport};
    use async_trait::async_trait;
    use formflow_core::FieldDefinition;
    use std::sync::Arc;

    struct NoConsent;

    #[async_trait]
    impl ConsentRegistry for NoConsent {
        async fn create_consent(&self, _request: &ConsentRequest) -> Result<Value, ConsentError> {
            Err(ConsentError::MissingApiKey)
        }
    }

    const CONFIG: &str = r#"
        [handlers.contact.actions.consent_registration]
        [handlers.contact.actions.autoresponder]
        subject = "Thanks for writing"
        [handlers.contact.actions.admin_notification]
        to = "office@example.com"
        [handlers.contact.actions.crm_sync]
        [handlers.contact.actions.disabled_one]
        enabled = false
    "#;

    fn services_with_transport() -> (ActionServices, Arc<MemoryTransport>) {
        let config: FormflowConfig = toml::from_str(CONFIG).unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let services = ActionServices::new(
            Arc::new(config),
            Arc::clone(&transport) as Arc<dyn MailTransport>,
            Arc::new(NoConsent),
        );
        (services, transport)
    }

    fn services() -> ActionServices {
        services_with_transport().0
    }

    fn form() -> Form {
        Form::new("contact")
            .with_field(FieldDefinition::new("name", "text"))
            .with_field(FieldDefinition::new("email", "text"))
            .with_field(
                FieldDefinition::new("topic", "select").with_options(&[("sales", "Sales"), ("support", "Support")]),
            )
    }

    #[test]
    fn test_previewable_actions_in_config_order() {
        let services = services();
        let registry = ActionRegistry::with_defaults();
        let entries = previewable_actions(&services.config, &registry, &form());
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["autoresponder", "admin_notification"]);
        assert_eq!(entries[0].name, "Autoresponder");
    }

    #[test]
    fn test_preview_autoresponder_uses_sample_submission() {
        let (services, transport) = services_with_transport();
        let registry = ActionRegistry::with_defaults();
        let message = preview_message(&services, &registry, &form(), "autoresponder").unwrap();
        assert_eq!(message.kind, MailKind::Autoresponder);
        assert_eq!(message.subject, "Thanks for writing");
        assert_eq!(message.to[0].address, SAMPLE_EMAIL);
        assert!(transport.is_empty());
    }

    #[test]
    fn test_preview_rejects_consent_and_unknown() {
        let services = services();
        let registry = ActionRegistry::with_defaults();
        assert!(matches!(
            preview_message(&services, &registry, &form(), "consent_registration"),
            Err(ActionError::InvalidConfig(_))
        ));
        assert!(matches!(
            preview_message(&services, &registry, &form(), "crm_sync"),
            Err(ActionError::UnregisteredAction(_))
        ));
    }

    #[test]
    fn test_sample_submission_values() {
        let submission = sample_submission(&form(), &ConfigMap::new());
        assert_eq!(submission.get_str("email"), Some(SAMPLE_EMAIL));
        assert_eq!(submission.get_str("topic"), Some("sales"));
        assert_eq!(submission.get_str("name"), Some("Sample name"));
    }
}
