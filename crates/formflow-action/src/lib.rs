//! Post-submission action pipeline for formflow.
//!
//! Runs the configured actions of a form (admin notification, autoresponder,
//! consent registration) in priority order, with conditional execution,
//! layered configuration, rate limiting and optional queuing.

pub mod condition;
pub mod consent;
pub mod error;
pub mod handler;
pub mod listener;
pub mod mail;
pub mod preview;
pub mod processor;
pub mod queue;
pub mod rate_limit;
pub mod result;
pub mod settings;

pub use condition::{Condition, Operator};
pub use consent::{ConsentRegistry, ConsentRequest, HttpConsentClient};
pub use error::{ActionError, ConsentError, SubmissionError};
pub use handler::{
    execute_action, ActionContext, ActionDescriptor, ActionRegistry, ActionServices, FormAction,
};
pub use listener::{FormSubmitted, MemorySubmissionStore, SubmissionListener, SubmissionStore};
pub use mail::{MailBuilder, MailKind, MailMessage, MailTransport};
pub use preview::{preview_message, previewable_actions, PreviewEntry};
pub use processor::{ActionSummary, FormProcessor};
pub use queue::{TokioWorkQueue, WorkQueue};
pub use rate_limit::{InMemoryRateLimiter, RateLimiter};
pub use result::{ActionResult, ActionResults, ProcessingOutcome, ProcessingResults};
