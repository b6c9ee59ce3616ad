//! Mail delivery backends.

use std::sync::Mutex;

use async_trait::async_trait;

use super::MailMessage;
use crate::error::ActionError;

/// Delivers built messages.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), ActionError>;
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), ActionError> {
        let to: Vec<String> = message.to.iter().map(ToString::to_string).collect();
        tracing::info!(
            kind = %message.kind,
            to = %to.join(", "),
            subject = %message.subject,
            template = %message.template.view,
            attachments = message.attachments.len(),
            "Mail delivered to log"
        );
        tracing::debug!(body = %message.text_body, "Mail body");
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<MailMessage>>,
    failure: Option<String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(reason.into()),
        }
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), ActionError> {
        if let Some(reason) = &self.failure {
            return Err(ActionError::Mail(reason.clone()));
        }
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(message.clone());
        Ok(())
    }
}
