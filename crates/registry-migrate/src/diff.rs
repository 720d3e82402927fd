//! Version set difference between source and destination metadata documents.

use crate::registry::VersionRecord;
use std::collections::BTreeMap;

/// Version identifiers present in the source document but absent from the
/// destination document, in sorted order. Pure; an empty result means
/// nothing to migrate and is a success outcome for callers.
pub fn missing_versions(
    source: &BTreeMap<String, VersionRecord>,
    dest: &BTreeMap<String, VersionRecord>,
) -> Vec<String> {
    source
        .keys()
        .filter(|version| !dest.contains_key(*version))
        .cloned()
        .collect()
}
