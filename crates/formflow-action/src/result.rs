//! Action and pipeline result types.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Outcome of one action execution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            data: None,
            errors: Vec::new(),
            message: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn success_with_data(data: Value, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            errors,
            message: None,
        }
    }

    pub fn failure_with_message(errors: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::failure(errors)
        }
    }

    /// Failure with an opaque payload, e.g. fault details kept out of the
    /// user-facing message.
    pub fn failure_with_data(errors: Vec<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::failure_with_message(errors, message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Action id -> result, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResults {
    entries: Vec<(String, ActionResult)>,
}

impl ActionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result. A second result for the same id replaces the first.
    pub fn insert(&mut self, action_id: impl Into<String>, result: ActionResult) {
        let action_id = action_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == action_id) {
            Some(entry) => entry.1 = result,
            None => self.entries.push((action_id, result)),
        }
    }

    pub fn get(&self, action_id: &str) -> Option<&ActionResult> {
        self.entries
            .iter()
            .find(|(id, _)| id == action_id)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionResult)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// True when no recorded result is a failure. Empty is successful.
    pub fn all_successful(&self) -> bool {
        self.entries.iter().all(|(_, r)| r.is_success())
    }
}

impl Serialize for ActionResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, result) in &self.entries {
            map.serialize_entry(id, result)?;
        }
        map.end()
    }
}

/// Results of one pipeline run: a single group, or one group per named
/// email configuration of the host form.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingResults {
    Single(ActionResults),
    Grouped(Vec<(String, ActionResults)>),
}

impl Default for ProcessingResults {
    fn default() -> Self {
        ProcessingResults::Single(ActionResults::new())
    }
}

impl ProcessingResults {
    /// Every result across every group, with its action id.
    pub fn iter_results(&self) -> Box<dyn Iterator<Item = (&str, &ActionResult)> + '_> {
        match self {
            ProcessingResults::Single(results) => Box::new(results.iter()),
            ProcessingResults::Grouped(groups) => {
                Box::new(groups.iter().flat_map(|(_, results)| results.iter()))
            }
        }
    }

    pub fn group(&self, email_config_id: &str) -> Option<&ActionResults> {
        match self {
            ProcessingResults::Single(_) => None,
            ProcessingResults::Grouped(groups) => groups
                .iter()
                .find(|(id, _)| id == email_config_id)
                .map(|(_, r)| r),
        }
    }

    /// All-or-nothing across groups.
    pub fn all_successful(&self) -> bool {
        self.iter_results().all(|(_, r)| r.is_success())
    }

    pub fn result_count(&self) -> usize {
        self.iter_results().count()
    }
}

impl Serialize for ProcessingResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProcessingResults::Single(results) => results.serialize(serializer),
            ProcessingResults::Grouped(groups) => {
                let mut map = serializer.serialize_map(Some(groups.len()))?;
                for (id, results) in groups {
                    map.serialize_entry(id, results)?;
                }
                map.end()
            }
        }
    }
}

/// Aggregate outcome handed back to the host.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The submission was throttled before any action ran.
    pub rate_limited: bool,
    pub results: ProcessingResults,
}

impl ProcessingOutcome {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            rate_limited: true,
            results: ProcessingResults::default(),
        }
    }

    pub fn no_actions() -> Self {
        Self {
            success: true,
            message: Some("No actions to process".to_string()),
            rate_limited: false,
            results: ProcessingResults::default(),
        }
    }

    pub fn from_results(results: ProcessingResults) -> Self {
        Self {
            success: results.all_successful(),
            message: None,
            rate_limited: false,
            results,
        }
    }

    /// Messages and errors of every failed action, in execution order.
    pub fn error_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for (_, result) in self.results.iter_results() {
            if result.is_failure() {
                if let Some(message) = result.message() {
                    messages.push(message.to_string());
                }
                messages.extend(result.errors().iter().cloned());
            }
        }
        messages.retain(|m| !m.is_empty());
        messages
    }
}
