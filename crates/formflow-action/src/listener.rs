//! Entry point the host calls for every form submission.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use formflow_core::{Form, ProcessingEvent, RequestContext, Submission, Timestamp};

use crate::error::SubmissionError;
use crate::processor::FormProcessor;

const PROCESSING_FAILED: &str = "Form processing failed";

/// A submission the host is about to accept.
#[derive(Debug, Clone)]
pub struct FormSubmitted {
    pub form: Arc<Form>,
    pub submission: Arc<Submission>,
    pub request: RequestContext,
}

impl FormSubmitted {
    pub fn new(form: Form, submission: Submission, request: RequestContext) -> Self {
        Self {
            form: Arc::new(form),
            submission: Arc::new(submission),
            request,
        }
    }
}

/// Persistence for accepted submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn save(&self, submission: &Submission) -> Result<(), SubmissionError>;
}

/// Keeps accepted submissions in memory.
#[derive(Debug, Default)]
pub struct MemorySubmissionStore {
    saved: Mutex<Vec<Submission>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        match self.saved.lock() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn save(&self, submission: &Submission) -> Result<(), SubmissionError> {
        let mut saved = match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        saved.push(submission.clone());
        Ok(())
    }
}

/// Runs the processor for a submission and turns its outcome into the
/// host's accept/reject decision.
pub struct SubmissionListener {
    processor: Arc<FormProcessor>,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionListener {
    pub fn new(processor: Arc<FormProcessor>, store: Arc<dyn SubmissionStore>) -> Self {
        Self { processor, store }
    }

    pub fn processor(&self) -> &FormProcessor {
        &self.processor
    }

    /// Process one submission.
    ///
    /// `Ok(None)` leaves the submission to the host untouched. Otherwise the
    /// returned flag tells the host whether to send its own default email.
    pub async fn handle(&self, event: &FormSubmitted) -> Result<Option<bool>, SubmissionError> {
        let form_handle = event.form.handle.as_str();
        let config = self.processor.config();
        if config.handler(form_handle).is_none() {
            tracing::debug!(form = %form_handle, "No handler configured, skipping");
            return Ok(None);
        }

        let outcome = self
            .processor
            .process(
                Arc::clone(&event.form),
                Arc::clone(&event.submission),
                &event.request,
                &event.form.email,
            )
            .await;

        if !outcome.success {
            let mut messages = if outcome.rate_limited {
                outcome.message.iter().cloned().collect()
            } else {
                outcome.error_messages()
            };
            if messages.is_empty() {
                messages.push(PROCESSING_FAILED.to_string());
            }
            tracing::error!(
                form = %form_handle,
                submission_id = %event.submission.id,
                errors = %messages.join("; "),
                "Form processing failed"
            );
            return Err(SubmissionError::Validation { messages });
        }

        if event.form.store {
            self.store.save(&event.submission).await?;
        } else {
            self.processor.events().emit(ProcessingEvent::SubmissionCreated {
                form_handle: form_handle.to_string(),
                submission_id: event.submission.id,
                timestamp: Timestamp::now(),
            });
        }

        Ok(Some(!config.disables_default_email(form_handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{ConsentRegistry, ConsentRequest};
    use crate::error::ConsentError;
    use crate::handler::test_support::{Behavior, ScriptedAction};
    use crate::handler::{ActionDescriptor, ActionRegistry, ActionServices, FormAction};
    use crate::mail::{MailTransport, MemoryTransport};
    use crate::rate_limit::TOO_MANY_SUBMISSIONS;
    use formflow_core::FormflowConfig;
    use serde_json::{json, Value};

    struct NoConsent;

    #[async_trait]
    impl ConsentRegistry for NoConsent {
        async fn create_consent(&self, _request: &ConsentRequest) -> Result<Value, ConsentError> {
            Err(ConsentError::MissingApiKey)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SubmissionStore for FailingStore {
        async fn save(&self, _submission: &Submission) -> Result<(), SubmissionError> {
            Err(SubmissionError::Persistence("disk full".to_string()))
        }
    }

    fn processor(toml: &str, behavior: fn() -> Behavior) -> Arc<FormProcessor> {
        let config: FormflowConfig = toml::from_str(toml).unwrap();
        let services = ActionServices::new(
            Arc::new(config),
            Arc::new(MemoryTransport::new()) as Arc<dyn MailTransport>,
            Arc::new(NoConsent),
        );
        let mut registry = ActionRegistry::new();
        registry.register(ActionDescriptor::new("scripted", move |_| {
            Ok(Arc::new(ScriptedAction::new("scripted", behavior())) as Arc<dyn FormAction>)
        }));
        Arc::new(FormProcessor::new(services, registry))
    }

    fn event(store: bool) -> FormSubmitted {
        let mut form = Form::new("contact");
        form.store = store;
        let data = json!({"email": "jane@example.com"});
        FormSubmitted::new(
            form,
            Submission::new("contact", data.as_object().cloned().unwrap()),
            RequestContext::default(),
        )
    }

    const HANDLER: &str = r#"
        [handlers.contact.actions.scripted]
    "#;

    #[tokio::test]
    async fn test_unconfigured_form_is_untouched() {
        let store = Arc::new(MemorySubmissionStore::new());
        let listener = SubmissionListener::new(processor("", || Behavior::Succeed), store.clone());
        assert!(listener.handle(&event(true)).await.unwrap().is_none());
        assert!(store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_success_stores_and_suppresses_default_email() {
        let store = Arc::new(MemorySubmissionStore::new());
        let listener = SubmissionListener::new(processor(HANDLER, || Behavior::Succeed), store.clone());
        assert_eq!(listener.handle(&event(true)).await.unwrap(), Some(false));
        assert_eq!(store.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_can_reenable_default_email() {
        let toml = r#"
            [handlers.contact]
            disable_default_email = false

            [handlers.contact.actions.scripted]
        "#;
        let listener = SubmissionListener::new(
            processor(toml, || Behavior::Succeed),
            Arc::new(MemorySubmissionStore::new()),
        );
        assert_eq!(listener.handle(&event(true)).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_non_storing_form_emits_submission_created() {
        let store = Arc::new(MemorySubmissionStore::new());
        let listener = SubmissionListener::new(processor(HANDLER, || Behavior::Succeed), store.clone());
        let mut events = listener.processor().events().subscribe();

        listener.handle(&event(false)).await.unwrap();

        assert!(store.submissions().is_empty());
        let mut created = false;
        while let Ok(event) = events.try_recv() {
            created |= event.name() == "submission_created";
        }
        assert!(created);
    }

    #[tokio::test]
    async fn test_failure_becomes_validation_error() {
        let store = Arc::new(MemorySubmissionStore::new());
        let listener = SubmissionListener::new(processor(HANDLER, || Behavior::Fail), store.clone());
        let err = listener.handle(&event(true)).await.unwrap_err();
        match err {
            SubmissionError::Validation { messages } => {
                assert_eq!(messages, vec!["scripted failed", "bad input"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_becomes_validation_error() {
        let toml = r#"
            [handlers.contact.rate_limit]
            enabled = true
            max_attempts = 1
            by = "email"

            [handlers.contact.actions.scripted]
        "#;
        let listener = SubmissionListener::new(
            processor(toml, || Behavior::Succeed),
            Arc::new(MemorySubmissionStore::new()),
        );
        listener.handle(&event(true)).await.unwrap();
        let err = listener.handle(&event(true)).await.unwrap_err();
        assert_eq!(err.to_string(), TOO_MANY_SUBMISSIONS);
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_persistence_error_propagates() {
        let listener = SubmissionListener::new(processor(HANDLER, || Behavior::Succeed), Arc::new(FailingStore));
        let err = listener.handle(&event(true)).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Persistence(_)));
    }
}
