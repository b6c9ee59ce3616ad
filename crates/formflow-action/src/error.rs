//! Error types for the action pipeline.

use formflow_core::error::FormflowError;

use crate::rate_limit::TOO_MANY_SUBMISSIONS;

/// Errors from action resolution and execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),
    #[error("Action not registered: {0}")]
    UnregisteredAction(String),
    #[error("Invalid action configuration: {0}")]
    InvalidConfig(String),
    #[error("Mail error: {0}")]
    Mail(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Consent registration failed: {0}")]
    Consent(#[from] ConsentError),
    #[error(transparent)]
    Core(#[from] FormflowError),
}

/// Errors from the consent registry client.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("Email is required for data consent")]
    MissingEmail,
    #[error("Invalid email address provided for data consent: {0}")]
    InvalidEmail(String),
    #[error("Consent API key is not configured")]
    MissingApiKey,
    #[error("Consent API returned error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("No consent ID was returned by the registry")]
    MissingConsentId,
    #[error("Consent request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors surfaced to the host by the submission listener.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Shown to the end user through the host's form-error display.
    #[error("{}", .messages.join("; "))]
    Validation { messages: Vec<String> },
    #[error("Failed to persist submission: {0}")]
    Persistence(String),
}

impl SubmissionError {
    /// The submission was throttled rather than failed by an action.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SubmissionError::Validation { messages } if messages.len() == 1 && messages[0] == TOO_MANY_SUBMISSIONS)
    }
}

impl From<ActionError> for FormflowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Core(inner) => inner,
            ActionError::UnregisteredAction(id) => FormflowError::UnknownAction(id),
            ActionError::Mail(msg) => FormflowError::Mail(msg),
            ActionError::Consent(e) => FormflowError::Consent(e.to_string()),
            other => FormflowError::Config(other.to_string()),
        }
    }
}

impl From<SubmissionError> for FormflowError {
    fn from(err: SubmissionError) -> Self {
        match err {
            err if err.is_rate_limited() => FormflowError::RateLimited,
            SubmissionError::Validation { messages } => {
                FormflowError::Rejected(messages.join("; "))
            }
            SubmissionError::Persistence(msg) => FormflowError::Persistence(msg),
        }
    }
}
