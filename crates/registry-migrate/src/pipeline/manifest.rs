//! Manifest patching: rewrite the repository URL inside an extracted
//! package's `package.json`.

use crate::error::{MigrateError, Result};
use serde_json::map::Entry;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

/// Set `repository.url` in the package manifest under `package_root`,
/// creating the `repository` object if absent, and rewrite the file in
/// place. Local-only mutation; safe to retry.
pub fn patch_repository_url(package_root: &Path, repository_url: &str) -> Result<()> {
    let manifest_path = package_root.join("package.json");
    if !manifest_path.exists() {
        return Err(MigrateError::ManifestNotFound(
            manifest_path.display().to_string(),
        ));
    }

    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| MigrateError::Disk(format!("reading {}: {}", manifest_path.display(), e)))?;

    let mut manifest: Value =
        serde_json::from_str(&content).map_err(|e| MigrateError::ManifestMalformed {
            path: manifest_path.display().to_string(),
            message: e.to_string(),
        })?;

    let obj = manifest
        .as_object_mut()
        .ok_or_else(|| MigrateError::ManifestMalformed {
            path: manifest_path.display().to_string(),
            message: "manifest is not a JSON object".to_string(),
        })?;

    // A string-form repository field gets replaced by the object form
    match obj.entry("repository") {
        Entry::Occupied(mut entry) => {
            if let Value::Object(repository) = entry.get_mut() {
                repository.insert("url".to_string(), json!(repository_url));
            } else {
                entry.insert(json!({ "url": repository_url }));
            }
        }
        Entry::Vacant(entry) => {
            entry.insert(json!({ "url": repository_url }));
        }
    }

    let mut output = serde_json::to_string_pretty(&manifest)?;
    output.push('\n');
    std::fs::write(&manifest_path, output)
        .map_err(|e| MigrateError::Disk(format!("writing {}: {}", manifest_path.display(), e)))?;

    debug!(
        "patched repository.url in {} -> {}",
        manifest_path.display(),
        repository_url
    );
    Ok(())
}
