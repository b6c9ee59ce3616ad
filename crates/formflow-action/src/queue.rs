//! Out-of-band execution for queued actions.
//!
//! A queued action's core logic is handed to a [`WorkQueue`] and the pipeline
//! moves on immediately. Whatever the job does later is invisible to the
//! pipeline: no result propagation, no retries.

use std::time::Duration;

use formflow_core::ConfigMap;
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ActionError;

/// A unit of deferred work.
pub type Job = BoxFuture<'static, ()>;

/// Routing and timing for a queued job, read from the action config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub connection: String,
    pub queue: String,
    pub delay: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            connection: "default".to_string(),
            queue: "default".to_string(),
            delay: Duration::ZERO,
        }
    }
}

impl QueueOptions {
    /// Read `queue_connection`, `queue_name` and `delay` (seconds).
    pub fn from_config(config: &ConfigMap) -> Self {
        let defaults = Self::default();
        let text = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let delay_secs = match config.get("delay") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Self {
            connection: text("queue_connection").unwrap_or(defaults.connection),
            queue: text("queue_name").unwrap_or(defaults.queue),
            delay: if delay_secs > 0.0 {
                Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
            } else {
                Duration::ZERO
            },
        }
    }
}

/// Receipt for a submitted job.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: Uuid,
    pub connection: String,
    pub queue: String,
    pub delay: Duration,
}

/// Accepts deferred jobs.
pub trait WorkQueue: Send + Sync {
    fn submit(&self, job: Job, options: QueueOptions) -> Result<TaskHandle, ActionError>;
}

/// Runs jobs as detached tokio tasks after their delay.
///
/// Connection and queue names are carried for logging only; every job lands
/// on the same runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioWorkQueue {
    runtime: Option<tokio::runtime::Handle>,
}

impl TokioWorkQueue {
    /// Spawn onto whichever runtime is current at submit time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn onto a specific runtime.
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            runtime: Some(handle),
        }
    }
}

impl WorkQueue for TokioWorkQueue {
    fn submit(&self, job: Job, options: QueueOptions) -> Result<TaskHandle, ActionError> {
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => tokio::runtime::Handle::try_current()
                .map_err(|e| ActionError::Queue(format!("no async runtime available: {}", e)))?,
        };

        let handle = TaskHandle {
            id: Uuid::new_v4(),
            connection: options.connection,
            queue: options.queue,
            delay: options.delay,
        };
        let delay = options.delay;
        let task_id = handle.id;

        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::debug!(task_id = %task_id, "Running queued job");
            job.await;
        });

        Ok(handle)
    }
}
