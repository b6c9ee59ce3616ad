//! Form action trait, registry and the shared execution contract.
//!
//! Every configured action goes through [`execute_action`], which applies the
//! conditions, validation, queuing and fault handling common to all variants
//! before calling the variant's own [`FormAction::handle`].

pub mod admin_notification;
pub mod autoresponder;
pub mod consent;

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use formflow_core::{ConfigMap, Form, FormflowConfig, Submission};
use futures::FutureExt;
use regex::Regex;
use serde_json::json;

use crate::condition::{is_empty, Condition};
use crate::consent::ConsentRegistry;
use crate::error::ActionError;
use crate::mail::{MailBuilder, MailKind, MailTransport};
use crate::queue::{QueueOptions, WorkQueue};
use crate::result::ActionResult;
use crate::settings::flag;

pub use admin_notification::AdminNotificationAction;
pub use autoresponder::AutoresponderAction;
pub use consent::ConsentRegistrationAction;

/// Priority used when neither the config nor the action sets one.
pub const DEFAULT_PRIORITY: i64 = 100;

/// The form and submission an action runs against.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub form: Arc<Form>,
    pub submission: Arc<Submission>,
}

impl ActionContext {
    pub fn new(form: Arc<Form>, submission: Arc<Submission>) -> Self {
        Self { form, submission }
    }
}

/// A post-submission action variant.
#[async_trait]
pub trait FormAction: Send + Sync {
    /// Stable identifier, matching the key under `actions` in the config.
    fn id(&self) -> &str;

    /// Lower runs earlier.
    fn priority(&self) -> i64 {
        DEFAULT_PRIORITY
    }

    /// Variant-specific precondition on the merged config.
    fn validate(&self, _config: &ConfigMap) -> bool {
        true
    }

    /// False when `enabled` is falsy or the `when` condition does not hold.
    fn should_execute(&self, submission: &Submission, config: &ConfigMap) -> bool {
        if is_disabled(config) {
            return false;
        }
        match config.get("when").and_then(Condition::from_config) {
            Some(condition) => condition.evaluate(submission),
            None => true,
        }
    }

    /// The message this action sends, if it is a mail action.
    fn mail_kind(&self) -> Option<MailKind> {
        None
    }

    /// The variant's core logic.
    async fn handle(&self, ctx: &ActionContext, config: &ConfigMap) -> Result<ActionResult, ActionError>;
}

/// Collaborators handed to action factories.
#[derive(Clone)]
pub struct ActionServices {
    pub config: Arc<FormflowConfig>,
    pub mail_builder: Arc<MailBuilder>,
    pub transport: Arc<dyn MailTransport>,
    pub consent: Arc<dyn ConsentRegistry>,
}

impl ActionServices {
    pub fn new(
        config: Arc<FormflowConfig>,
        transport: Arc<dyn MailTransport>,
        consent: Arc<dyn ConsentRegistry>,
    ) -> Self {
        let mail_builder = Arc::new(MailBuilder::new(Arc::clone(&config)));
        Self {
            config,
            mail_builder,
            transport,
            consent,
        }
    }

    pub fn with_mail_builder(mut self, mail_builder: MailBuilder) -> Self {
        self.mail_builder = Arc::new(mail_builder);
        self
    }
}

pub type ActionFactory =
    Arc<dyn Fn(&ActionServices) -> Result<Arc<dyn FormAction>, ActionError> + Send + Sync>;

/// Registry metadata plus a factory for one action variant.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub id: String,
    pub name: String,
    pub previewable: bool,
    /// Config keys the action reads beyond the common ones.
    pub config_fields: Vec<&'static str>,
    factory: ActionFactory,
}

impl ActionDescriptor {
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ActionServices) -> Result<Arc<dyn FormAction>, ActionError> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            name: humanize_action_id(&id),
            id,
            previewable: true,
            config_fields: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn previewable(mut self, previewable: bool) -> Self {
        self.previewable = previewable;
        self
    }

    pub fn with_config_fields(mut self, fields: &[&'static str]) -> Self {
        self.config_fields = fields.to_vec();
        self
    }

    pub fn instantiate(&self, services: &ActionServices) -> Result<Arc<dyn FormAction>, ActionError> {
        (self.factory)(services)
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("previewable", &self.previewable)
            .finish_non_exhaustive()
    }
}

/// Identifier -> descriptor lookup for configured actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    descriptors: HashMap<String, ActionDescriptor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in actions.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    pub fn register(&mut self, descriptor: ActionDescriptor) {
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    pub fn register_defaults(&mut self) {
        self.register(AdminNotificationAction::descriptor());
        self.register(AutoresponderAction::descriptor());
        self.register(ConsentRegistrationAction::descriptor());
    }

    pub fn get(&self, id: &str) -> Option<&ActionDescriptor> {
        self.descriptors.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Instantiate the action registered under `id`.
    pub fn resolve(&self, id: &str, services: &ActionServices) -> Result<Arc<dyn FormAction>, ActionError> {
        self.get(id)
            .ok_or_else(|| ActionError::UnregisteredAction(id.to_string()))?
            .instantiate(services)
    }
}

/// `send_admin_notification_action` -> `Admin Notification`.
pub fn humanize_action_id(id: &str) -> String {
    let mut base = id.trim();
    for suffix in ["_action", "-action"] {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
        }
    }
    for prefix in ["send_", "send-"] {
        if let Some(stripped) = base.strip_prefix(prefix) {
            base = stripped;
        }
    }
    crate::mail::translate::title_case(base)
}

/// `enabled` is present and falsy.
pub fn is_disabled(config: &ConfigMap) -> bool {
    matches!(config.get("enabled"), Some(v) if !v.is_null() && is_empty(v))
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}$",
        )
        .expect("Invalid email regex")
    })
}

/// Syntactically valid, ASCII-only email address.
pub fn is_valid_email(email: &str) -> bool {
    email.is_ascii() && email.len() <= 254 && email_pattern().is_match(email)
}

/// Run one action under the common contract.
///
/// Skipped actions succeed with a "skipped" message. Invalid configs fail
/// without running. Queued actions are handed to `queue` and succeed at once.
/// Errors and panics from the action become failure results and never
/// propagate.
pub async fn execute_action(
    action: Arc<dyn FormAction>,
    ctx: &ActionContext,
    config: ConfigMap,
    queue: &dyn WorkQueue,
) -> ActionResult {
    let id = action.id().to_string();
    let outcome = AssertUnwindSafe(run_contract(action, ctx, &config, queue))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => fault_result(&id, ctx, err.to_string(), format!("{:?}", err)),
        Err(panic) => {
            let err = ActionError::HandlerFailed(panic_message(panic.as_ref()));
            fault_result(&id, ctx, err.to_string(), format!("panic: {:?}", err))
        }
    }
}

async fn run_contract(
    action: Arc<dyn FormAction>,
    ctx: &ActionContext,
    config: &ConfigMap,
    queue: &dyn WorkQueue,
) -> Result<ActionResult, ActionError> {
    let id = action.id().to_string();

    if !action.should_execute(&ctx.submission, config) {
        return Ok(ActionResult::success_with_message(format!(
            "{} skipped due to conditions not being met",
            id
        )));
    }

    if !action.validate(config) {
        tracing::error!(action = %id, form = %ctx.form.handle, "Action validation failed: invalid configuration");
        return Ok(ActionResult::failure(vec![format!(
            "Invalid configuration for {}",
            id
        )]));
    }

    if flag(config, "queue", false) {
        let options = QueueOptions::from_config(config);
        tracing::debug!(
            action = %id,
            connection = %options.connection,
            queue = %options.queue,
            delay_secs = options.delay.as_secs_f64(),
            "Queueing action"
        );
        queue.submit(queued_job(action, ctx.clone(), config.clone()), options)?;
        return Ok(ActionResult::success_with_message(format!("{} queued successfully", id)));
    }

    action.handle(ctx, config).await
}

/// The deferred body of a queued action. Its outcome is only logged.
fn queued_job(action: Arc<dyn FormAction>, ctx: ActionContext, config: ConfigMap) -> crate::queue::Job {
    async move {
        let outcome = AssertUnwindSafe(action.handle(&ctx, &config)).catch_unwind().await;
        let id = action.id();
        let form = ctx.form.handle.as_str();
        match outcome {
            Ok(Ok(result)) if result.is_success() => {
                tracing::info!(action = %id, form = %form, "Queued action completed");
            }
            Ok(Ok(result)) => {
                tracing::warn!(action = %id, form = %form, errors = ?result.errors(), "Queued action reported failure");
            }
            Ok(Err(err)) => {
                tracing::error!(action = %id, form = %form, error = %err, detail = ?err, "Queued action failed");
            }
            Err(panic) => {
                let err = ActionError::HandlerFailed(panic_message(panic.as_ref()));
                tracing::error!(action = %id, form = %form, error = %err, "Queued action panicked");
            }
        }
    }
    .boxed()
}

fn fault_result(id: &str, ctx: &ActionContext, message: String, detail: String) -> ActionResult {
    tracing::error!(
        action = %id,
        form = %ctx.form.handle,
        error = %message,
        detail = %detail,
        "Action execution failed"
    );
    ActionResult::failure_with_data(
        Vec::new(),
        format!("Action {} failed", id),
        json!({ "error": message }),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
