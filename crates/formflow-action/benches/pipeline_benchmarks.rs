//! Benchmarks for the synchronous parts of the pipeline.
//!
//! Planning (resolution plus stable priority sort) and condition evaluation
//! run for every submission before any action does I/O.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use formflow_action::handler::{
    AdminNotificationAction, AutoresponderAction, ConsentRegistrationAction,
};
use formflow_action::mail::MemoryTransport;
use formflow_action::{
    ActionRegistry, ActionServices, Condition, ConsentError, ConsentRegistry, ConsentRequest,
    FormProcessor, MailTransport,
};
use formflow_core::{FormflowConfig, Submission};
use serde_json::{json, Value};

struct NoConsent;

#[async_trait]
impl ConsentRegistry for NoConsent {
    async fn create_consent(&self, _request: &ConsentRequest) -> Result<Value, ConsentError> {
        Err(ConsentError::MissingApiKey)
    }
}

/// A handler with `count` actions cycling through the built-in ids with
/// explicit priorities. Every fourth id is left unregistered.
fn config_with_actions(count: usize) -> FormflowConfig {
    let ids = ["admin_notification", "autoresponder", "consent_registration", "crm_sync"];
    let mut toml = String::from("[consent]\npublic_key = \"bench\"\n");
    for i in 0..count {
        toml.push_str(&format!(
            "[handlers.contact.actions.{}_{}]\npriority = {}\n",
            ids[i % ids.len()],
            i,
            (i * 37) % 100
        ));
    }
    toml.push_str("[handlers.contact.actions.admin_notification]\nto = \"office@example.com\"\n");
    toml.push_str("[handlers.contact.actions.autoresponder]\n");
    toml.push_str("[handlers.contact.actions.consent_registration]\n");
    toml::from_str(&toml).expect("bench config")
}

/// Default registry plus an alias of a built-in for every numbered id.
fn registry(count: usize) -> ActionRegistry {
    let mut registry = ActionRegistry::with_defaults();
    for i in 0..count {
        let mut descriptor = match i % 4 {
            0 => AdminNotificationAction::descriptor(),
            1 => AutoresponderAction::descriptor(),
            2 => ConsentRegistrationAction::descriptor(),
            _ => continue,
        };
        descriptor.id = format!("{}_{}", descriptor.id, i);
        registry.register(descriptor);
    }
    registry
}

fn processor(count: usize) -> FormProcessor {
    let config = config_with_actions(count);
    let services = ActionServices::new(
        Arc::new(config),
        Arc::new(MemoryTransport::new()) as Arc<dyn MailTransport>,
        Arc::new(NoConsent),
    );
    FormProcessor::new(services, registry(count))
}

fn bench_action_plan(c: &mut Criterion) {
    let small = processor(0);
    let large = processor(200);

    let mut group = c.benchmark_group("action_plan");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("default_actions", |b| b.iter(|| small.action_plan("contact")));
    group.bench_function("mixed_200_actions", |b| b.iter(|| large.action_plan("contact")));

    group.finish();
}

fn bench_condition_evaluation(c: &mut Criterion) {
    let submission = Submission::new(
        "contact",
        json!({
            "email": "jane@example.com",
            "age": "42",
            "topics": ["sales", "support", "billing"],
            "newsletter": true,
            "message": "A fairly long message body that a contains check has to scan through."
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    );

    let conditions: Vec<(&str, Condition)> = [
        ("equals", json!({"field": "newsletter", "value": "1"})),
        ("numeric", json!({"field": "age", "operator": ">=", "value": 18})),
        ("contains", json!({"field": "message", "operator": "contains", "value": "scan"})),
        ("in_list", json!({"field": "topics", "operator": "contains", "value": "billing"})),
        ("not_empty", json!({"field": "email", "operator": "not_empty"})),
    ]
    .into_iter()
    .filter_map(|(name, config)| Condition::from_config(&config).map(|c| (name, c)))
    .collect();

    let mut group = c.benchmark_group("condition_evaluation");
    for (name, condition) in &conditions {
        group.bench_function(*name, |b| b.iter(|| condition.evaluate(&submission)));
    }
    group.bench_function("all", |b| {
        b.iter(|| conditions.iter().filter(|(_, c)| c.evaluate(&submission)).count())
    });
    group.finish();
}

criterion_group!(benches, bench_action_plan, bench_condition_evaluation);
criterion_main!(benches);
