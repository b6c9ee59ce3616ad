//! Conditional execution of actions.
//!
//! An action config may carry `when = { field, operator, value }`. The field
//! is looked up on the submission and compared against `value` using the
//! loose comparison rules form data usually needs (numeric strings compare as
//! numbers, booleans compare by truthiness).

use std::cmp::Ordering;
use std::str::FromStr;

use formflow_core::Submission;
use serde_json::Value;

/// Comparison operators accepted in `when.operator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    StrictEquals,
    StrictNotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    In,
    NotIn,
    Empty,
    NotEmpty,
}

impl FromStr for Operator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" | "equals" => Ok(Operator::Equals),
            "!=" | "not_equals" => Ok(Operator::NotEquals),
            "===" | "strict_equals" => Ok(Operator::StrictEquals),
            "!==" | "strict_not_equals" => Ok(Operator::StrictNotEquals),
            ">" | "greater_than" => Ok(Operator::GreaterThan),
            ">=" | "greater_than_or_equal" => Ok(Operator::GreaterThanOrEqual),
            "<" | "less_than" => Ok(Operator::LessThan),
            "<=" | "less_than_or_equal" => Ok(Operator::LessThanOrEqual),
            "contains" => Ok(Operator::Contains),
            "not_contains" => Ok(Operator::NotContains),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            "empty" => Ok(Operator::Empty),
            "not_empty" => Ok(Operator::NotEmpty),
            other => Err(format!("Unknown condition operator: {}", other)),
        }
    }
}

/// A single-field predicate over a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: Option<String>,
    pub operator: String,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: Some(field.into()),
            operator: operator.into(),
            value,
        }
    }

    /// Read a condition from a `when` config value. Non-table values yield `None`.
    pub fn from_config(when: &Value) -> Option<Self> {
        let map = when.as_object()?;
        Some(Self {
            field: map
                .get("field")
                .and_then(Value::as_str)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            operator: map
                .get("operator")
                .and_then(Value::as_str)
                .unwrap_or("=")
                .to_string(),
            value: map.get("value").cloned().unwrap_or(Value::Null),
        })
    }

    /// Evaluate against a submission. A missing field name or an unknown
    /// operator is permissive (true).
    pub fn evaluate(&self, submission: &Submission) -> bool {
        let Some(field) = self.field.as_deref() else {
            return true;
        };
        let operator = match self.operator.parse::<Operator>() {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(field = %field, error = %e, "Treating unknown operator as satisfied");
                return true;
            }
        };
        let actual = submission.get(field).unwrap_or(&Value::Null);
        compare(actual, operator, &self.value)
    }
}

/// Apply `operator` to a field value and the configured value.
pub fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Equals => loose_eq(actual, expected),
        Operator::NotEquals => !loose_eq(actual, expected),
        Operator::StrictEquals => actual == expected,
        Operator::StrictNotEquals => actual != expected,
        Operator::GreaterThan => loose_cmp(actual, expected) == Some(Ordering::Greater),
        Operator::GreaterThanOrEqual => matches!(
            loose_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::LessThan => loose_cmp(actual, expected) == Some(Ordering::Less),
        Operator::LessThanOrEqual => matches!(
            loose_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Contains => contains(actual, expected),
        Operator::NotContains => !contains(actual, expected),
        Operator::In => in_set(actual, expected),
        Operator::NotIn => !in_set(actual, expected),
        Operator::Empty => is_empty(actual),
        Operator::NotEmpty => !is_empty(actual),
    }
}

/// Null, false, zero, "", "0", and empty lists or tables are empty.
pub fn is_empty(value: &Value) -> bool {
    !is_truthy(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) | Value::Null => Some(String::new()),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => is_truthy(a) == is_truthy(b),
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other),
        (Value::Number(_), Value::Number(_)) => as_number(a) == as_number(b),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => scalar_string(a) == scalar_string(b),
            }
        }
        (Value::String(x), Value::String(y)) => match (as_number(a), as_number(b)) {
            (Some(m), Some(n)) => m == n,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| loose_eq(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map(|w| loose_eq(v, w)).unwrap_or(false))
        }
        _ => false,
    }
}

fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
            Some(is_truthy(a).cmp(&is_truthy(b)))
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => match (scalar_string(a), scalar_string(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        _ => match (scalar_string(haystack), scalar_string(needle)) {
            (Some(h), Some(n)) => h.contains(&n),
            _ => false,
        },
    }
}

fn in_set(value: &Value, set: &Value) -> bool {
    match set {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        single => loose_eq(value, single),
    }
}
