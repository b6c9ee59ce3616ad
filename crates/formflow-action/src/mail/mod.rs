//! Mail message construction for the notification and autoresponder actions.
//!
//! [`MailBuilder`] turns a merged action config plus a submission into a
//! [`MailMessage`]: subject, recipients, template selection, template data,
//! a plain-text body and attachments. Delivery is a [`MailTransport`] concern.

pub mod attachments;
pub mod recipients;
pub mod sanitize;
pub mod text;
pub mod transport;
pub mod translate;

use std::fmt;
use std::sync::Arc;

use formflow_core::{ConfigMap, Form, FormflowConfig, Submission};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;

pub use attachments::{AssetResolver, Attachment, DirectoryAssets, NoAssets};
pub use recipients::Mailbox;
pub use transport::{LogTransport, MailTransport, MemoryTransport};
pub use translate::{MapTranslator, NoTranslations, Translator};

use crate::settings::{as_bool, handle_list, non_blank};
use attachments::resolve_attachments;
use recipients::{parse_recipients, resolve_placeholders};

const DEFAULT_SUBJECT: &str = "New Submission";
const TRANSLATE_PREFIX: &str = "translate:";
const CHOICE_FIELD_TYPES: [&str; 4] = ["checkboxes", "radio", "select", "button_group"];

/// Which message a mail action sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailKind {
    AdminNotification,
    Autoresponder,
}

impl MailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailKind::AdminNotification => "admin_notification",
            MailKind::Autoresponder => "autoresponder",
        }
    }

    pub fn default_html_view(&self) -> &'static str {
        match self {
            MailKind::AdminNotification => "formflow::html.emails.admin-notification",
            MailKind::Autoresponder => "formflow::html.emails.autoresponder",
        }
    }

    pub fn default_text_view(&self) -> &'static str {
        match self {
            MailKind::AdminNotification => "formflow::text.emails.admin-notification",
            MailKind::Autoresponder => "formflow::text.emails.autoresponder",
        }
    }
}

impl fmt::Display for MailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    Html,
    Markdown,
    Text,
}

/// View the host renderer should use for the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub format: TemplateFormat,
    pub view: String,
}

/// A fully built, not yet delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub kind: MailKind,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Mailbox>,
    pub to: Vec<Mailbox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Mailbox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Mailbox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reply_to: Vec<Mailbox>,
    pub template: Template,
    /// Template data: the merged action config with a `fields` entry.
    pub data: ConfigMap,
    pub text_body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl MailMessage {
    /// Submission fields as they appear in the message.
    pub fn fields(&self) -> Option<&ConfigMap> {
        self.data.get("fields").and_then(Value::as_object)
    }
}

/// Builds [`MailMessage`]s from merged action configs.
#[derive(Clone)]
pub struct MailBuilder {
    config: Arc<FormflowConfig>,
    translator: Arc<dyn Translator>,
    assets: Arc<dyn AssetResolver>,
}

impl MailBuilder {
    /// Builder using the config's translation table and no asset storage.
    pub fn new(config: Arc<FormflowConfig>) -> Self {
        let translator = Arc::new(MapTranslator::from_config(&config));
        Self {
            config,
            translator,
            assets: Arc::new(NoAssets),
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetResolver>) -> Self {
        self.assets = assets;
        self
    }

    pub fn build(
        &self,
        kind: MailKind,
        form: &Form,
        submission: &Submission,
        config: &ConfigMap,
    ) -> Result<MailMessage, ActionError> {
        let to = match kind {
            MailKind::AdminNotification => self.admin_recipients(config),
            MailKind::Autoresponder => self.autoresponder_recipients(submission, config),
        };
        if to.is_empty() {
            return Err(ActionError::Mail(format!(
                "No recipient address could be resolved for {}",
                kind
            )));
        }

        let reply_to = match kind {
            MailKind::AdminNotification => self.reply_to(submission, config),
            MailKind::Autoresponder => Vec::new(),
        };

        let sanitize = config.get("sanitize_content").map(as_bool).unwrap_or(true);
        let fields = self.fields(form, submission, config, sanitize);
        let text_body = text::render_text_body(
            kind,
            &fields,
            &self.organization_name(config),
            self.translator.as_ref(),
        );

        let mut data = self.template_data(config, sanitize);
        data.insert("fields".to_string(), Value::Object(fields));

        Ok(MailMessage {
            kind,
            subject: self.subject(config),
            from: self.sender(config),
            to,
            cc: self.mailboxes(config.get("cc"), config),
            bcc: self.mailboxes(config.get("bcc"), config),
            reply_to,
            template: template_for(kind, config),
            data,
            text_body,
            attachments: resolve_attachments(form, submission, config, self.assets.as_ref()),
        })
    }

    fn subject(&self, config: &ConfigMap) -> String {
        let subject = config
            .get("subject")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUBJECT);
        let subject = match subject.strip_prefix(TRANSLATE_PREFIX) {
            Some(key) => self.translator.translate_or(key, key),
            None => subject.to_string(),
        };
        resolve_placeholders(&subject, config, &self.config.mail)
    }

    fn mailboxes(&self, value: Option<&Value>, config: &ConfigMap) -> Vec<Mailbox> {
        value
            .map(|v| parse_recipients(v, config, &self.config.mail))
            .unwrap_or_default()
            .into_iter()
            .map(Mailbox::new)
            .collect()
    }

    fn sender(&self, config: &ConfigMap) -> Option<Mailbox> {
        let settings = &self.config.mail;
        self.mailboxes(config.get("from"), config)
            .into_iter()
            .next()
            .map(|mb| mb.with_name(non_blank(config, "from_name").or_else(|| settings.from_name.clone())))
            .or_else(|| {
                settings
                    .from_address
                    .clone()
                    .map(|address| Mailbox::new(address).with_name(settings.from_name.clone()))
            })
    }

    /// Configured `to`, else the installation sender address.
    fn admin_recipients(&self, config: &ConfigMap) -> Vec<Mailbox> {
        let settings = &self.config.mail;
        let mut addresses = config
            .get("to")
            .map(|v| parse_recipients(v, config, settings))
            .unwrap_or_default();
        if addresses.is_empty() {
            addresses.extend(settings.from_address.clone());
        }
        let name = non_blank(config, "to_name").or_else(|| settings.from_name.clone());
        addresses
            .into_iter()
            .map(|address| Mailbox::new(address).with_name(name.clone()))
            .collect()
    }

    fn autoresponder_recipients(&self, submission: &Submission, config: &ConfigMap) -> Vec<Mailbox> {
        let email_field = config
            .get("email_field")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("email");
        let Some(email) = submission.get_str(email_field) else {
            return Vec::new();
        };
        let name = recipient_name(submission, config);
        parse_recipients(&Value::String(email.to_string()), config, &self.config.mail)
            .into_iter()
            .map(|address| Mailbox::new(address).with_name(name.clone()))
            .collect()
    }

    fn reply_to(&self, submission: &Submission, config: &ConfigMap) -> Vec<Mailbox> {
        let configured = ["reply_to", "replyTo"]
            .iter()
            .filter_map(|key| config.get(*key))
            .find(|v| !crate::condition::is_empty(v));
        match configured {
            Some(value) => self.mailboxes(Some(value), config),
            None => submission
                .get_str("email")
                .map(|email| vec![Mailbox::new(email.trim())])
                .unwrap_or_default(),
        }
    }

    fn organization_name(&self, config: &ConfigMap) -> String {
        non_blank(config, "organization_name")
            .or_else(|| non_blank(&self.config.email, "organization_name"))
            .unwrap_or_else(|| "Formflow".to_string())
    }

    fn template_data(&self, config: &ConfigMap, sanitize: bool) -> ConfigMap {
        let resolved: ConfigMap = config
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => Value::String(resolve_placeholders(s, config, &self.config.mail)),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        if sanitize {
            sanitize::sanitize_map(&resolved)
        } else {
            resolved
        }
    }

    /// Submission data minus excluded handles, with choice values mapped to labels.
    fn fields(&self, form: &Form, submission: &Submission, config: &ConfigMap, sanitize: bool) -> ConfigMap {
        let mut excluded = handle_list(self.config.email.get("exclude_fields")).unwrap_or_default();
        excluded.extend(handle_list(config.get("exclude_fields")).unwrap_or_default());

        let prefixes = handle_list(config.get("translations_prefix_key")).unwrap_or_default();
        let fallback = config.get("translation_fallback").map(as_bool).unwrap_or(false);

        let mut fields = ConfigMap::new();
        for (handle, value) in &submission.data {
            if excluded.iter().any(|h| h == handle) {
                continue;
            }
            let value = match form.field(handle) {
                Some(field)
                    if !field.options.is_empty()
                        && CHOICE_FIELD_TYPES.contains(&field.field_type.as_str()) =>
                {
                    let label = |key: &str| {
                        let label = field.option_label(key).unwrap_or(key);
                        Value::String(translate::translate_option(
                            self.translator.as_ref(),
                            &prefixes,
                            key,
                            label,
                            fallback,
                        ))
                    };
                    match value {
                        Value::String(key) => label(key.as_str()),
                        Value::Array(keys) => Value::Array(
                            keys.iter()
                                .map(|k| match k {
                                    Value::String(key) => label(key.as_str()),
                                    other => other.clone(),
                                })
                                .collect(),
                        ),
                        other => other.clone(),
                    }
                }
                _ => value.clone(),
            };
            let value = if sanitize {
                sanitize::sanitize_value(&value)
            } else {
                value
            };
            fields.insert(handle.clone(), value);
        }
        fields
    }
}

/// `name_field` > first + last name > `name`.
fn recipient_name(submission: &Submission, config: &ConfigMap) -> Option<String> {
    if let Some(name_field) = non_blank(config, "name_field") {
        return submission.get_str(&name_field).map(|n| n.trim().to_string());
    }
    let first = submission
        .get_str("first_name")
        .or_else(|| submission.get_str("firstname"));
    let last = submission
        .get_str("last_name")
        .or_else(|| submission.get_str("lastname"));
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{} {}", first.trim(), last.trim())),
        _ => submission.get_str("name").map(|n| n.trim().to_string()),
    }
}

fn template_for(kind: MailKind, config: &ConfigMap) -> Template {
    let template_type = config
        .get("template_type")
        .and_then(Value::as_str)
        .unwrap_or("html")
        .to_ascii_lowercase();
    let format = match template_type.as_str() {
        "markdown" => TemplateFormat::Markdown,
        "text" => TemplateFormat::Text,
        _ => TemplateFormat::Html,
    };
    let view = match format {
        TemplateFormat::Html | TemplateFormat::Markdown => {
            non_blank(config, "html").unwrap_or_else(|| kind.default_html_view().to_string())
        }
        TemplateFormat::Text => {
            non_blank(config, "text").unwrap_or_else(|| kind.default_text_view().to_string())
        }
    };
    Template { format, view }
}
