//! Config fingerprint and template source digest: stable hashes of
//! everything that affects rendering.
use serde_json::{Map, Value, json};
use std::path::Path;

use super::slash_path;
use crate::config::index::{INDEX_FILE, TemplateIndex};
use crate::resources::helpers::fs::{hash_bytes, hash_file, list_files};

/// Key paths rewritten by every sync run; they never affect rendered output.
const VOLATILE_KEYS: &[&[&str]] = &[
    &["sync", "last_synced_at"],
    &["sync", "tool_version"],
    &["last_synced_at"],
];

/// Lowercase hex SHA-256 over the canonical JSON of `config` (volatile keys
/// removed) together with `source_root`.
///
/// Object key order never affects the result.
#[must_use]
pub fn fingerprint(config: &Value, source_root: &Path) -> String {
    let mut stripped = config.clone();
    for path in VOLATILE_KEYS {
        remove_path(&mut stripped, path);
    }
    let document = json!({
        "config": canonical(&stripped),
        "source_root": source_root.to_string_lossy(),
    });
    hash_bytes(document.to_string().as_bytes())
}

/// Lowercase hex SHA-256 over the template source: the content of
/// `index.toml` plus the relative path and content hash of every template
/// and bundle member `index` would compile.
///
/// Entries that cannot be read hash as `unreadable`.
#[must_use]
pub fn source_digest(index: &TemplateIndex, source_root: &Path) -> String {
    let mut lines = Vec::new();
    let index_file = source_root.join(INDEX_FILE);
    if index_file.is_file() {
        lines.push(format!("{INDEX_FILE}\t{}", content_hash(&index_file)));
    }
    for category in &index.categories {
        let prefix = format!("{}:{}", category.name, category.source_dir);
        let Ok(entries) = category.template_entries(source_root) else {
            lines.push(format!("{prefix}\tunreadable"));
            continue;
        };
        for entry in entries {
            let name = entry
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let rel = format!("{prefix}/{name}");
            if !entry.is_bundle {
                lines.push(format!("{rel}\t{}", content_hash(&entry.source)));
                continue;
            }
            match list_files(&entry.source) {
                Ok(members) => lines.extend(members.iter().map(|member| {
                    format!(
                        "{rel}/{}\t{}",
                        slash_path(member),
                        content_hash(&entry.source.join(member))
                    )
                })),
                Err(_) => lines.push(format!("{rel}\tunreadable")),
            }
        }
    }
    lines.sort();
    hash_bytes(lines.join("\n").as_bytes())
}

fn content_hash(path: &Path) -> String {
    hash_file(path).unwrap_or_else(|_| "unreadable".to_string())
}

/// Remove the key at `path`. A parent object left empty by the removal is
/// removed too. Returns whether anything was removed.
fn remove_path(value: &mut Value, path: &[&str]) -> bool {
    let Some(object) = value.as_object_mut() else {
        return false;
    };
    match path {
        [] => false,
        [last] => object.remove(*last).is_some(),
        [head, rest @ ..] => {
            let Some(child) = object.get_mut(*head) else {
                return false;
            };
            let removed = remove_path(child, rest);
            if removed && child.as_object().is_some_and(Map::is_empty) {
                object.remove(*head);
            }
            removed
        }
    }
}

/// Rebuild `value` with object keys inserted in sorted order, so the
/// serialization is identical whichever map representation serde_json uses.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                if let Some(child) = object.get(key) {
                    sorted.insert(key.clone(), canonical(child));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
