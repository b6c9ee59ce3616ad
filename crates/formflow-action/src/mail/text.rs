//! Plain-text rendering of submission fields.

use chrono::Datelike;
use formflow_core::ConfigMap;
use serde_json::Value;

use super::translate::{field_label, Translator};
use super::MailKind;

/// Render a value the way it appears after `Label: `.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// One `Label: value` line per field, in submission order.
pub fn field_lines(fields: &ConfigMap, translator: &dyn Translator) -> Vec<String> {
    fields
        .iter()
        .map(|(handle, value)| format!("{}: {}", field_label(translator, handle), display_value(value)))
        .collect()
}

/// Full plain-text body for a message.
pub fn render_text_body(
    kind: MailKind,
    fields: &ConfigMap,
    organization: &str,
    translator: &dyn Translator,
) -> String {
    let t = |key: &str, fallback: &str| translator.translate_or(&format!("forms.{}", key), fallback);
    let mut lines = Vec::new();

    match kind {
        MailKind::AdminNotification => {
            lines.push(t("admin_notification_title", "New Form Submission Details"));
            lines.push(String::new());
            lines.push(t(
                "admin_notification_intro",
                "You have received a new form submission. Here are the details:",
            ));
        }
        MailKind::Autoresponder => {
            let mut greeting = t("hello", "Hello!");
            if let Some(first) = fields.get("first_name").and_then(Value::as_str) {
                greeting = format!("{} {}", greeting, first.trim());
            }
            lines.push(format!("{},", greeting));
            lines.push(String::new());
            lines.push(format!(
                "{} {}",
                t("autoresponder_title", "Thank you for your submission!"),
                t(
                    "autoresponder_intro",
                    "We have received your submission and will get back to you shortly."
                )
            ));
            lines.push(String::new());
            lines.push(t("autoresponder_data_intro", "Here is a copy of your submission data:"));
        }
    }

    lines.push(String::new());
    lines.extend(field_lines(fields, translator));

    if kind == MailKind::Autoresponder {
        lines.push(String::new());
        lines.push(format!("{},", t("regards", "Regards")));
        lines.push(t("the_team", "Team"));
    }

    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(format!(
        "© {} {}. {}",
        chrono::Utc::now().year(),
        organization,
        t("rights_reserved", "All rights reserved.")
    ));
    lines.join("\n")
}
