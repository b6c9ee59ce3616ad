//! Autoresponder action: confirms receipt to the person who submitted.

use std::sync::Arc;

use async_trait::async_trait;
use formflow_core::ConfigMap;
use serde_json::json;

use crate::error::ActionError;
use crate::handler::{is_valid_email, ActionContext, ActionDescriptor, FormAction};
use crate::mail::{MailBuilder, MailKind, MailTransport};
use crate::result::ActionResult;
use crate::settings::non_blank;

pub const ID: &str = "autoresponder";
const DEFAULT_EMAIL_FIELD: &str = "email";

/// Sends the autoresponder email (priority 60).
pub struct AutoresponderAction {
    mail_builder: Arc<MailBuilder>,
    transport: Arc<dyn MailTransport>,
}

impl AutoresponderAction {
    pub fn new(mail_builder: Arc<MailBuilder>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            mail_builder,
            transport,
        }
    }

    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(ID, |services| {
            Ok(Arc::new(Self::new(
                Arc::clone(&services.mail_builder),
                Arc::clone(&services.transport),
            )) as Arc<dyn FormAction>)
        })
        .with_config_fields(&[
            "email_field",
            "name_field",
            "subject",
            "template_type",
            "html",
            "text",
            "exclude_fields",
            "attachments",
        ])
    }
}

#[async_trait]
impl FormAction for AutoresponderAction {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i64 {
        60
    }

    fn mail_kind(&self) -> Option<MailKind> {
        Some(MailKind::Autoresponder)
    }

    async fn handle(&self, ctx: &ActionContext, config: &ConfigMap) -> Result<ActionResult, ActionError> {
        let email_field = non_blank(config, "email_field").unwrap_or_else(|| DEFAULT_EMAIL_FIELD.to_string());

        let Some(email) = ctx.submission.get_str(&email_field).map(str::trim) else {
            return Ok(ActionResult::failure_with_message(
                vec!["No email address found in submission".to_string()],
                "Autoresponder failed: no email field",
            ));
        };

        if !is_valid_email(email) {
            return Ok(ActionResult::failure_with_message(
                vec![format!("Invalid email address format: {}", email)],
                "Autoresponder failed: invalid email address",
            ));
        }

        let message = self
            .mail_builder
            .build(MailKind::Autoresponder, &ctx.form, &ctx.submission, config)?;
        self.transport.send(&message).await?;

        Ok(ActionResult::success_with_data(
            json!({ "to": email, "subject": message.subject }),
            "Autoresponder email sent successfully",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MemoryTransport;
    use formflow_core::{Form, FormflowConfig, Submission};
    use serde_json::Value;

    fn setup() -> (AutoresponderAction, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let action = AutoresponderAction::new(
            Arc::new(MailBuilder::new(Arc::new(FormflowConfig::default()))),
            Arc::clone(&transport) as Arc<dyn MailTransport>,
        );
        (action, transport)
    }

    fn ctx(data: Value) -> ActionContext {
        ActionContext::new(
            Arc::new(Form::new("contact")),
            Arc::new(Submission::new("contact", data.as_object().cloned().unwrap())),
        )
    }

    #[tokio::test]
    async fn test_sends_to_submitter() {
        let (action, transport) = setup();
        let result = action
            .handle(
                &ctx(json!({"email": "jane@example.com", "first_name": "Jane", "last_name": "Doe"})),
                &ConfigMap::new(),
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.message(), Some("Autoresponder email sent successfully"));
        let sent = transport.messages();
        assert_eq!(sent[0].to[0].to_string(), "Jane Doe <jane@example.com>");
        assert_eq!(sent[0].kind, MailKind::Autoresponder);
    }

    #[tokio::test]
    async fn test_custom_email_field() {
        let (action, transport) = setup();
        let cfg = json!({"email_field": "contact_email"});
        let result = action
            .handle(&ctx(json!({"contact_email": "j@example.com"})), cfg.as_object().unwrap())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(transport.messages()[0].to[0].address, "j@example.com");
    }

    #[tokio::test]
    async fn test_missing_email() {
        let (action, transport) = setup();
        let result = action
            .handle(&ctx(json!({"name": "Jane"})), &ConfigMap::new())
            .await
            .unwrap();
        assert!(result.is_failure());
        assert_eq!(result.message(), Some("Autoresponder failed: no email field"));
        assert_eq!(result.errors(), ["No email address found in submission"]);
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_email() {
        let (action, transport) = setup();
        let result = action
            .handle(&ctx(json!({"email": "jäne@example.com"})), &ConfigMap::new())
            .await
            .unwrap();
        assert!(result.is_failure());
        assert_eq!(result.errors(), ["Invalid email address format: jäne@example.com"]);
        assert!(transport.is_empty());
    }

    #[test]
    fn test_priority() {
        let (action, _) = setup();
        assert_eq!(action.priority(), 60);
    }
}
