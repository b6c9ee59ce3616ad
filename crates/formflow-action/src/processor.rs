//! The action pipeline.
//!
//! [`FormProcessor::process`] runs the configured actions of one form for one
//! submission: rate-limit check, layered config merge, priority ordering,
//! sequential execution and result aggregation. Actions never run
//! concurrently; a later action may rely on an earlier one having finished.

use std::sync::Arc;
use std::time::Duration;

use formflow_core::config::merge_layers;
use formflow_core::{
    ConfigMap, EventBus, Form, FormEmailConfig, FormflowConfig, ProcessingEvent, RequestContext,
    Submission, Timestamp,
};
use serde::Serialize;

use crate::handler::{
    execute_action, is_disabled, ActionContext, ActionRegistry, ActionServices, FormAction,
    DEFAULT_PRIORITY,
};
use crate::queue::{TokioWorkQueue, WorkQueue};
use crate::rate_limit::{rate_limit_key, InMemoryRateLimiter, RateLimiter, TOO_MANY_SUBMISSIONS};
use crate::result::{ActionResults, ProcessingOutcome, ProcessingResults};
use crate::settings::integer;

/// One configured action, resolved and prioritised.
struct PlannedAction {
    id: String,
    config: ConfigMap,
    priority: i64,
    action: Option<Arc<dyn FormAction>>,
}

/// A configured action as reported by [`FormProcessor::action_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub id: String,
    pub name: String,
    pub priority: i64,
    pub enabled: bool,
    pub registered: bool,
    pub previewable: bool,
}

/// Runs form actions for submissions.
pub struct FormProcessor {
    registry: Arc<ActionRegistry>,
    services: ActionServices,
    rate_limiter: Arc<dyn RateLimiter>,
    queue: Arc<dyn WorkQueue>,
    events: EventBus,
}

impl FormProcessor {
    /// Processor with an in-memory rate limiter and a tokio work queue.
    pub fn new(services: ActionServices, registry: ActionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            services,
            rate_limiter: Arc::new(InMemoryRateLimiter::new()),
            queue: Arc::new(TokioWorkQueue::new()),
            events: EventBus::default(),
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &FormflowConfig {
        &self.services.config
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ActionServices {
        &self.services
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run every configured action of `form` for `submission`.
    ///
    /// With named email configs the whole action set runs once per config,
    /// each config layered between the handler base and the action config.
    pub async fn process(
        &self,
        form: Arc<Form>,
        submission: Arc<Submission>,
        request: &RequestContext,
        email_configs: &[FormEmailConfig],
    ) -> ProcessingOutcome {
        let form_handle = form.handle.clone();
        let handler = self.config().handler(&form_handle);

        if let Some(handler) = handler {
            if !self.check_rate_limit(&form_handle, handler, &submission, request) {
                tracing::warn!(
                    form = %form_handle,
                    ip = request.ip.as_deref().unwrap_or("unknown"),
                    submission_id = %submission.id,
                    "Rate limit exceeded"
                );
                return ProcessingOutcome::rate_limited(TOO_MANY_SUBMISSIONS);
            }
        }

        let Some(handler) = handler.filter(|h| h.has_actions()) else {
            tracing::info!(form = %form_handle, "No actions configured");
            return ProcessingOutcome::no_actions();
        };

        let base = self.config().handler_base_config(&form_handle);
        let entries = handler.action_entries();
        let ctx = ActionContext::new(form, submission);

        let results = if email_configs.is_empty() {
            ProcessingResults::Single(self.execute_group(&ctx, &entries, &base, &ConfigMap::new()).await)
        } else {
            let mut groups = Vec::with_capacity(email_configs.len());
            for email_config in email_configs {
                tracing::debug!(form = %form_handle, email_config = %email_config.id, "Running actions for email config");
                let results = self
                    .execute_group(&ctx, &entries, &base, &email_config.settings)
                    .await;
                groups.push((email_config.id.clone(), results));
            }
            ProcessingResults::Grouped(groups)
        };

        ProcessingOutcome::from_results(results)
    }

    /// Configured actions of a form in execution order.
    pub fn action_plan(&self, form_handle: &str) -> Vec<ActionSummary> {
        let Some(handler) = self.config().handler(form_handle) else {
            return Vec::new();
        };
        self.plan(&handler.action_entries())
            .into_iter()
            .map(|planned| {
                let descriptor = self.registry.get(&planned.id);
                ActionSummary {
                    name: descriptor
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| planned.id.clone()),
                    enabled: !is_disabled(&planned.config),
                    registered: descriptor.is_some(),
                    previewable: descriptor.is_some_and(|d| d.previewable),
                    priority: planned.priority,
                    id: planned.id,
                }
            })
            .collect()
    }

    /// Check and record an attempt. Always true when rate limiting is off.
    fn check_rate_limit(
        &self,
        form_handle: &str,
        handler: &formflow_core::config::HandlerConfig,
        submission: &Submission,
        request: &RequestContext,
    ) -> bool {
        let limit = &handler.rate_limit;
        if !limit.enabled {
            return true;
        }
        let key = rate_limit_key(form_handle, limit, submission, request);
        let decay = Duration::from_secs(limit.decay_minutes.saturating_mul(60));
        self.rate_limiter.attempt(&key, limit.max_attempts, decay)
    }

    /// Resolve and stable-sort configured actions by priority. Unregistered
    /// ids are left in with the default priority and skipped at execution.
    fn plan(&self, entries: &[formflow_core::config::ActionEntry]) -> Vec<PlannedAction> {
        let mut planned: Vec<PlannedAction> = entries
            .iter()
            .map(|entry| {
                let action = match self.registry.resolve(&entry.id, &self.services) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        tracing::debug!(action = %entry.id, error = %e, "Could not resolve action");
                        None
                    }
                };
                let priority = integer(&entry.config, "priority")
                    .or_else(|| action.as_ref().map(|a| a.priority()))
                    .unwrap_or(DEFAULT_PRIORITY);
                PlannedAction {
                    id: entry.id.clone(),
                    config: entry.config.clone(),
                    priority,
                    action,
                }
            })
            .collect();
        planned.sort_by_key(|p| p.priority);
        planned
    }

    async fn execute_group(
        &self,
        ctx: &ActionContext,
        entries: &[formflow_core::config::ActionEntry],
        base: &ConfigMap,
        email_layer: &ConfigMap,
    ) -> ActionResults {
        let form_handle = ctx.form.handle.as_str();
        let submission_id = ctx.submission.id;
        let planned = self.plan(entries);

        self.events.emit(ProcessingEvent::FormProcessingStarted {
            form_handle: form_handle.to_string(),
            submission_id,
            actions: planned.iter().map(|p| p.id.clone()).collect(),
            timestamp: Timestamp::now(),
        });

        let mut results = ActionResults::new();
        for PlannedAction { id, config, action, .. } in planned {
            let Some(action) = action else {
                tracing::error!(action = %id, form = %form_handle, "Action is not registered, skipping");
                continue;
            };
            if is_disabled(&config) {
                tracing::info!(action = %id, form = %form_handle, "Action is disabled");
                continue;
            }

            let merged = merge_layers([base, email_layer, &config]);
            let result = execute_action(action, ctx, merged, self.queue.as_ref()).await;

            if result.is_success() {
                if self.config().logging.enabled {
                    tracing::info!(
                        action = %id,
                        form = %form_handle,
                        message = result.message().unwrap_or_default(),
                        "Action executed successfully"
                    );
                }
                self.events.emit(ProcessingEvent::ActionExecuted {
                    action_id: id.clone(),
                    form_handle: form_handle.to_string(),
                    submission_id,
                    message: result.message().map(str::to_string),
                    timestamp: Timestamp::now(),
                });
            } else {
                tracing::error!(
                    action = %id,
                    form = %form_handle,
                    errors = ?result.errors(),
                    message = result.message().unwrap_or_default(),
                    "Action failed"
                );
                self.events.emit(ProcessingEvent::ActionFailed {
                    action_id: id.clone(),
                    form_handle: form_handle.to_string(),
                    submission_id,
                    message: result.message().map(str::to_string),
                    errors: result.errors().to_vec(),
                    timestamp: Timestamp::now(),
                });
            }
            results.insert(id, result);
        }

        self.events.emit(ProcessingEvent::FormProcessingCompleted {
            form_handle: form_handle.to_string(),
            submission_id,
            success: results.all_successful(),
            timestamp: Timestamp::now(),
        });
        results
    }
}
