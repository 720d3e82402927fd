//! Registry metadata documents and the publish request body.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Full metadata document for one module on one registry: every published
/// version keyed by version identifier.
#[derive(Debug, Clone)]
pub struct Packument {
    /// Module name as reported by the registry.
    pub name: Option<String>,

    /// All published versions. Empty is valid (a module with zero versions).
    pub versions: BTreeMap<String, VersionRecord>,
}

/// Wire form of a packument. A document without a `versions` member is an
/// absent module, which the client must distinguish from `versions: {}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PackumentDoc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub versions: Option<BTreeMap<String, VersionRecord>>,
}

impl PackumentDoc {
    /// Convert to a [`Packument`], or None when the document carries no
    /// versions member at all.
    pub(crate) fn into_packument(self) -> Option<Packument> {
        self.versions.map(|versions| Packument {
            name: self.name,
            versions,
        })
    }
}

/// Metadata for one published version: an arbitrary JSON object carrying at
/// least a `dist.tarball` download URL, and possibly a registry-private `_`
/// field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionRecord(pub Map<String, Value>);

impl VersionRecord {
    /// Tarball download URL from the `dist` object.
    pub fn tarball_url(&self) -> Option<&str> {
        self.0.get("dist")?.get("tarball")?.as_str()
    }

    /// Copy with the registry-private `_` field and the `dist` object
    /// removed. The destination registry computes its own distribution
    /// metadata, and `_` must never be forwarded across registries.
    pub fn stripped_for_publish(&self) -> VersionRecord {
        let mut fields = self.0.clone();
        fields.remove("_");
        fields.remove("dist");
        VersionRecord(fields)
    }
}

/// Build the npm-protocol publish body: the stripped version record under
/// `versions`, a `latest` dist-tag, public access, and the artifact bytes
/// base64-encoded under `_attachments`.
pub fn publish_body(
    module: &str,
    version: &str,
    record: &VersionRecord,
    tarball: &[u8],
) -> Value {
    let basename = module.rsplit('/').next().unwrap_or(module);
    let filename = format!("{}-{}.tgz", basename, version);
    let data = base64::engine::general_purpose::STANDARD.encode(tarball);

    json!({
        "_id": module,
        "name": module,
        "dist-tags": { "latest": version },
        "versions": { version: record.stripped_for_publish() },
        "access": "public",
        "_attachments": {
            filename: {
                "content_type": "application/octet-stream",
                "data": data,
                "length": tarball.len(),
            }
        }
    })
}
