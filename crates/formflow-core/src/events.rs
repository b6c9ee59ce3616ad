use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::Timestamp;

/// Events emitted while a submission is processed.
///
/// Consumed by external listeners (audit log, metrics, UI). Emission is
/// fire-and-forget; the pipeline never waits on a listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ProcessingEvent {
    /// The ordered action set for one execution group is about to run.
    FormProcessingStarted {
        form_handle: String,
        submission_id: Uuid,
        actions: Vec<String>,
        timestamp: Timestamp,
    },

    /// An action returned a successful result.
    ActionExecuted {
        action_id: String,
        form_handle: String,
        submission_id: Uuid,
        message: Option<String>,
        timestamp: Timestamp,
    },

    /// An action returned a failure result.
    ActionFailed {
        action_id: String,
        form_handle: String,
        submission_id: Uuid,
        message: Option<String>,
        errors: Vec<String>,
        timestamp: Timestamp,
    },

    /// Every action of one execution group has run.
    FormProcessingCompleted {
        form_handle: String,
        submission_id: Uuid,
        success: bool,
        timestamp: Timestamp,
    },

    /// A submission was accepted but the form does not persist submissions.
    SubmissionCreated {
        form_handle: String,
        submission_id: Uuid,
        timestamp: Timestamp,
    },
}

impl ProcessingEvent {
    /// Short machine-readable event name.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingEvent::FormProcessingStarted { .. } => "form_processing_started",
            ProcessingEvent::ActionExecuted { .. } => "action_executed",
            ProcessingEvent::ActionFailed { .. } => "action_failed",
            ProcessingEvent::FormProcessingCompleted { .. } => "form_processing_completed",
            ProcessingEvent::SubmissionCreated { .. } => "submission_created",
        }
    }
}

/// Broadcast channel for processing events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProcessingEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ProcessingEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(success: bool) -> ProcessingEvent {
        ProcessingEvent::FormProcessingCompleted {
            form_handle: "contact".to_string(),
            submission_id: Uuid::new_v4(),
            success,
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(completed(true));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(ProcessingEvent::ActionExecuted {
            action_id: "autoresponder".to_string(),
            form_handle: "contact".to_string(),
            submission_id: Uuid::new_v4(),
            message: Some("sent".to_string()),
            timestamp: Timestamp::now(),
        });
        bus.emit(completed(false));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "action_executed");
        match rx.recv().await.unwrap() {
            ProcessingEvent::FormProcessingCompleted { success, .. } => assert!(!success),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_variant_tag() {
        let json = serde_json::to_value(completed(true)).unwrap();
        assert!(json.get("FormProcessingCompleted").is_some());
    }

    #[test]
    fn test_event_names() {
        let id = Uuid::new_v4();
        let ts = Timestamp::now();
        let cases = vec![
            (
                ProcessingEvent::FormProcessingStarted {
                    form_handle: "f".into(),
                    submission_id: id,
                    actions: vec![],
                    timestamp: ts,
                },
                "form_processing_started",
            ),
            (
                ProcessingEvent::ActionFailed {
                    action_id: "a".into(),
                    form_handle: "f".into(),
                    submission_id: id,
                    message: None,
                    errors: vec!["boom".into()],
                    timestamp: ts,
                },
                "action_failed",
            ),
            (
                ProcessingEvent::SubmissionCreated {
                    form_handle: "f".into(),
                    submission_id: id,
                    timestamp: ts,
                },
                "submission_created",
            ),
        ];
        for (event, name) in cases {
            assert_eq!(event.name(), name);
        }
    }
}
