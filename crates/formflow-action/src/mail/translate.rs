//! Translation lookups for subjects, field labels and option labels.

use std::collections::BTreeMap;

use formflow_core::FormflowConfig;

/// Resolves translation keys. `None` means the key has no translation.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> Option<String>;

    fn translate_or(&self, key: &str, fallback: &str) -> String {
        self.translate(key).unwrap_or_else(|| fallback.to_string())
    }
}

/// Translator with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslations;

impl Translator for NoTranslations {
    fn translate(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Translator backed by a flat key/value table.
#[derive(Debug, Clone, Default)]
pub struct MapTranslator {
    entries: BTreeMap<String, String>,
}

impl MapTranslator {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Use the `[translations]` table of the installation config.
    pub fn from_config(config: &FormflowConfig) -> Self {
        Self::new(config.translations.clone())
    }
}

impl Translator for MapTranslator {
    fn translate(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// `first_name` / `send-admin` to `First Name` / `Send Admin`.
pub fn title_case(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display label for a field handle.
///
/// Tries the bare handle, then `labels.mail.fields.<handle>`, then
/// `labels.<handle>`, then falls back to the title-cased handle.
pub fn field_label(translator: &dyn Translator, handle: &str) -> String {
    [
        handle.to_string(),
        format!("labels.mail.fields.{}", handle),
        format!("labels.{}", handle),
    ]
    .iter()
    .find_map(|key| translator.translate(key))
    .unwrap_or_else(|| title_case(handle))
}

/// Translate the label of a selected option.
///
/// Each prefix is tried against the option key, then against the label. With
/// `fallback` on, the title-cased option key is tried as a last resort before
/// returning the label unchanged.
pub fn translate_option(
    translator: &dyn Translator,
    prefixes: &[String],
    option_key: &str,
    label: &str,
    fallback: bool,
) -> String {
    for prefix in prefixes {
        for candidate in [option_key, label] {
            if let Some(translated) = translator.translate(&format!("{}{}", prefix, candidate)) {
                return translated;
            }
        }
    }
    if fallback {
        if let Some(translated) = translator.translate(&title_case(option_key)) {
            return translated;
        }
    }
    label.to_string()
}
