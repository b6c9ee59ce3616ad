//! Attachment selection from upload fields.

use std::path::{Path, PathBuf};

use formflow_core::{ConfigMap, Form, Submission};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::{as_bool, handle_list};

/// A file to attach to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Handle of the field the file came from.
    pub field: String,
    pub path: PathBuf,
    pub filename: String,
}

impl Attachment {
    fn from_path(field: &str, path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            field: field.to_string(),
            path,
            filename,
        }
    }
}

/// Maps asset identifiers stored in `assets` fields to files on disk.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, asset_id: &str) -> Option<PathBuf>;
}

/// Resolver that knows no assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetResolver for NoAssets {
    fn resolve(&self, _asset_id: &str) -> Option<PathBuf> {
        None
    }
}

/// Resolves `container::path` (or plain relative path) ids under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetResolver for DirectoryAssets {
    fn resolve(&self, asset_id: &str) -> Option<PathBuf> {
        let relative = asset_id
            .split_once("::")
            .map(|(_, path)| path)
            .unwrap_or(asset_id);
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return None;
        }
        let candidate = self.root.join(relative);
        candidate.is_file().then_some(candidate)
    }
}

fn wrap(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Collect attachments for a message.
///
/// When `attachments` is unset they are on iff the form has an `assets`
/// field. `attach_fields` restricts which fields are considered and
/// `exclude_attachments` removes fields.
pub fn resolve_attachments(
    form: &Form,
    submission: &Submission,
    config: &ConfigMap,
    assets: &dyn AssetResolver,
) -> Vec<Attachment> {
    let enabled = match config.get("attachments") {
        None | Some(Value::Null) => form.has_field_type("assets"),
        Some(value) => as_bool(value),
    };
    if !enabled {
        return Vec::new();
    }

    let allowed = handle_list(config.get("attach_fields")).filter(|list| !list.is_empty());
    let excluded = handle_list(config.get("exclude_attachments")).unwrap_or_default();

    let mut attachments = Vec::new();
    for field in &form.fields {
        let handle = field.handle.as_str();
        if excluded.iter().any(|h| h == handle) {
            continue;
        }
        if let Some(allowed) = &allowed {
            if !allowed.iter().any(|h| h == handle) {
                continue;
            }
        }
        let value = match submission.get(handle) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(value) => value,
        };

        match field.field_type.as_str() {
            "assets" => {
                for id in wrap(value).into_iter().filter_map(Value::as_str) {
                    match assets.resolve(id) {
                        Some(path) => attachments.push(Attachment::from_path(handle, path)),
                        None => tracing::warn!(field = %handle, asset = %id, "Asset not found, not attached"),
                    }
                }
            }
            "file" | "files" => {
                for path in wrap(value).into_iter().filter_map(Value::as_str) {
                    let path = PathBuf::from(path);
                    if path.is_file() {
                        attachments.push(Attachment::from_path(handle, path));
                    } else if let Some(resolved) = assets.resolve(&path.to_string_lossy()) {
                        attachments.push(Attachment::from_path(handle, resolved));
                    }
                }
            }
            _ => {}
        }
    }
    attachments
}
