//! formflow binary - composition root.
//!
//! 1. Load configuration from TOML and apply environment overrides
//! 2. Initialise tracing
//! 3. Build the action services, registry and processor
//! 4. Run the requested subcommand and print its result as JSON

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use formflow_action::mail::{DirectoryAssets, LogTransport};
use formflow_action::{
    preview_message, previewable_actions, ActionError, ActionRegistry, ActionServices,
    FormProcessor, FormSubmitted, HttpConsentClient, MailBuilder, MemorySubmissionStore,
    SubmissionError, SubmissionListener,
};
use formflow_core::{
    ConfigMap, Form, FormEmailConfig, FormflowConfig, FormflowError, RequestContext, Submission,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};

fn init_tracing(args: &CliArgs, config: &FormflowConfig) {
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(args.resolve_log_level(&config.logging.level))),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> formflow_core::Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn load_form(handle: &str, form_file: Option<&Path>) -> formflow_core::Result<Form> {
    let Some(path) = form_file else {
        return Ok(Form::new(handle));
    };
    let form: Form = read_json(path)?;
    if form.handle != handle {
        return Err(FormflowError::Config(format!(
            "Form file {} defines form '{}', expected '{}'",
            path.display(),
            form.handle,
            handle
        )));
    }
    Ok(form)
}

fn build_services(
    config: Arc<FormflowConfig>,
    assets_dir: Option<&Path>,
) -> formflow_core::Result<ActionServices> {
    let consent = HttpConsentClient::from_config(&config.consent).map_err(ActionError::from)?;
    let mut services = ActionServices::new(Arc::clone(&config), Arc::new(LogTransport), Arc::new(consent));
    if let Some(dir) = assets_dir {
        services = services.with_mail_builder(
            MailBuilder::new(config).with_assets(Arc::new(DirectoryAssets::new(dir))),
        );
    }
    Ok(services)
}

fn print_json(value: &Value) -> formflow_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn submit(
    config: Arc<FormflowConfig>,
    form_handle: &str,
    data: &Path,
    form_file: Option<&Path>,
    email_configs: Option<&Path>,
    request: RequestContext,
    assets_dir: Option<&Path>,
) -> formflow_core::Result<bool> {
    let mut form = load_form(form_handle, form_file)?;
    if let Some(path) = email_configs {
        form.email = read_json::<Vec<FormEmailConfig>>(path)?;
    }
    let data: ConfigMap = read_json(data)?;
    let submission = Submission::new(form_handle, data);
    let submission_id = submission.id;

    let services = build_services(config, assets_dir)?;
    let processor = Arc::new(FormProcessor::new(services, ActionRegistry::with_defaults()));
    let mut events = processor.events().subscribe();
    let listener = SubmissionListener::new(Arc::clone(&processor), Arc::new(MemorySubmissionStore::new()));

    tracing::info!(form = %form_handle, submission_id = %submission_id, "Processing submission");
    let result = listener
        .handle(&FormSubmitted::new(form, submission, request))
        .await;

    let mut emitted = Vec::new();
    while let Ok(event) = events.try_recv() {
        emitted.push(serde_json::to_value(&event)?);
    }

    let (accepted, mut output) = match result {
        Ok(None) => (
            true,
            json!({"submission_id": submission_id, "status": "unhandled"}),
        ),
        Ok(Some(send_default_email)) => (
            true,
            json!({
                "submission_id": submission_id,
                "status": "accepted",
                "send_default_email": send_default_email,
            }),
        ),
        Err(err @ SubmissionError::Validation { .. }) => {
            let rate_limited = err.is_rate_limited();
            let messages = match &err {
                SubmissionError::Validation { messages } => messages.clone(),
                _ => Vec::new(),
            };
            let reason = FormflowError::from(err);
            tracing::warn!(form = %form_handle, submission_id = %submission_id, error = %reason, "Submission rejected");
            (
                false,
                json!({
                    "submission_id": submission_id,
                    "status": "rejected",
                    "rate_limited": rate_limited,
                    "errors": messages,
                }),
            )
        }
        Err(e) => return Err(e.into()),
    };

    output["events"] = Value::Array(emitted);
    print_json(&output)?;
    Ok(accepted)
}

fn list_actions(config: Arc<FormflowConfig>, form_handle: &str) -> formflow_core::Result<()> {
    if config.handler(form_handle).is_none() {
        return Err(FormflowError::UnknownForm(form_handle.to_string()));
    }
    let services = build_services(config, None)?;
    let processor = FormProcessor::new(services, ActionRegistry::with_defaults());
    let plan = processor.action_plan(form_handle);
    print_json(&json!({"form": form_handle, "actions": plan}))
}

fn preview(
    config: Arc<FormflowConfig>,
    form_handle: &str,
    action_id: &str,
    form_file: Option<&Path>,
) -> formflow_core::Result<()> {
    let form = load_form(form_handle, form_file)?;
    let registry = ActionRegistry::with_defaults();
    let services = build_services(Arc::clone(&config), None)?;

    let available = previewable_actions(&config, &registry, &form);
    if !available.iter().any(|entry| entry.id == action_id) {
        tracing::warn!(form = %form_handle, action = %action_id, "Action is not configured as previewable for this form");
    }

    let message = preview_message(&services, &registry, &form, action_id)?;
    print_json(&serde_json::to_value(&message)?)
}

#[tokio::main]
async fn main() -> formflow_core::Result<()> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let config_found = config_path.exists();
    let mut config = if config_found {
        FormflowConfig::load(&config_path)?
    } else {
        FormflowConfig::default()
    };
    config.apply_env_overrides();

    init_tracing(&args, &config);
    if config_found {
        tracing::debug!(path = %config_path.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_path.display(), "No configuration file found, using defaults");
    }
    let config = Arc::new(config);

    match args.command {
        Command::Submit {
            form,
            data,
            form_file,
            email_configs,
            ip,
            session,
            assets_dir,
        } => {
            let request = RequestContext {
                ip,
                session_id: session,
                locale: None,
            };
            let accepted = submit(
                config,
                &form,
                &data,
                form_file.as_deref(),
                email_configs.as_deref(),
                request,
                assets_dir.as_deref(),
            )
            .await?;
            if !accepted {
                std::process::exit(1);
            }
        }
        Command::Actions { form } => list_actions(config, &form)?,
        Command::Preview {
            form,
            action,
            form_file,
        } => preview(config, &form, &action, form_file.as_deref())?,
    }

    Ok(())
}
