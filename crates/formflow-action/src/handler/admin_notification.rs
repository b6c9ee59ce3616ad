//! Admin notification action.
//!
//! Emails the site owner a summary of the submission.

use std::sync::Arc;

use async_trait::async_trait;
use formflow_core::ConfigMap;
use serde_json::json;

use crate::error::ActionError;
use crate::handler::{is_valid_email, ActionContext, ActionDescriptor, FormAction};
use crate::mail::recipients::{is_placeholder, raw_recipients};
use crate::mail::{MailBuilder, MailKind, MailTransport};
use crate::result::ActionResult;

pub const ID: &str = "admin_notification";

/// Sends the admin notification email (priority 30).
pub struct AdminNotificationAction {
    mail_builder: Arc<MailBuilder>,
    transport: Arc<dyn MailTransport>,
}

impl AdminNotificationAction {
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
            "to",
            "to_name",
            "from",
            "cc",
            "bcc",
            "reply_to",
            "subject",
            "template_type",
            "html",
            "text",
            "exclude_fields",
            "attachments",
            "attach_fields",
            "exclude_attachments",
        ])
    }
}

#[async_trait]
impl FormAction for AdminNotificationAction {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i64 {
        30
    }

    fn mail_kind(&self) -> Option<MailKind> {
        Some(MailKind::AdminNotification)
    }

    async fn handle(&self, ctx: &ActionContext, config: &ConfigMap) -> Result<ActionResult, ActionError> {
        if let Some(to) = config.get("to") {
            // Placeholders are checked once resolved, below.
            let invalid = raw_recipients(to)
                .into_iter()
                .find(|r| !is_placeholder(r) && !is_valid_email(r));
            if let Some(address) = invalid {
                return Ok(invalid_recipient(&ctx.form.handle, &address));
            }
        }

        let message = self
            .mail_builder
            .build(MailKind::AdminNotification, &ctx.form, &ctx.submission, config)?;
        if let Some(mailbox) = message.to.iter().find(|m| !is_valid_email(&m.address)) {
            return Ok(invalid_recipient(&ctx.form.handle, &mailbox.address));
        }
        self.transport.send(&message).await?;

        let recipients: Vec<String> = message.to.iter().map(|m| m.address.clone()).collect();
        tracing::debug!(form = %ctx.form.handle, to = ?recipients, "Admin notification sent");
        Ok(ActionResult::success_with_data(
            json!({ "to": recipients, "subject": message.subject }),
            "Admin notification email sent successfully",
        ))
    }
}

fn invalid_recipient(form_handle: &str, address: &str) -> ActionResult {
    tracing::warn!(form = %form_handle, address = %address, "Invalid admin recipient");
    ActionResult::failure_with_message(
        vec![format!("Invalid recipient email address: {}", address)],
        "Admin notification failed: invalid recipient",
    )
}
