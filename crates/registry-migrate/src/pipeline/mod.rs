//! Per-version migration pipeline.
//!
//! One [`MigrationUnit`] flows through staging, patching, packaging and
//! publishing as a sequential chain of suspension points; a failure at any
//! stage short-circuits the remaining stages for that unit only. Siblings
//! are unaffected.

pub mod manifest;
pub mod pack;
pub mod stage;

use crate::error::{MigrateError, Result};
use crate::registry::{publish_body, with_retry, RegistryClient, VersionRecord};
use tracing::debug;

/// One (module, version) pair pending transfer, with its source metadata.
/// Created from the version diff, discarded once the unit reaches a
/// terminal state; never persisted across runs.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    /// Module name (unprefixed).
    pub module: String,

    /// Version identifier.
    pub version: String,

    /// Source version record; carries the tarball URL, republished in
    /// stripped form.
    pub record: VersionRecord,
}

/// Terminal state of a successfully processed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Published to the destination; the version is durably present there.
    Completed,

    /// Processed without publishing (dry run).
    Skipped,
}

/// Drive one unit through the pipeline.
///
/// With `dry_run`, the artifact is staged (and patched/packaged when a
/// repository URL is configured) but never published, and the unit is
/// reported as skipped. Without `dry_run` the caller has already validated
/// that `repository_url` is present.
pub async fn run_unit(
    source: &RegistryClient,
    target: &RegistryClient,
    unit: &MigrationUnit,
    repository_url: Option<&str>,
    max_retries: u32,
    dry_run: bool,
) -> Result<UnitStatus> {
    let tarball_url = unit.record.tarball_url().ok_or_else(|| {
        MigrateError::download(
            format!("{}@{}", unit.module, unit.version),
            "version record has no dist.tarball URL",
        )
    })?;

    // Staging: the temp dir lives until the end of this function, so every
    // exit path below cleans it up.
    let staged = stage::stage(source, &unit.module, &unit.version, tarball_url, max_retries).await?;

    let Some(repository_url) = repository_url else {
        debug!(
            "{}@{}: no repository URL configured, stopping after staging",
            unit.module, unit.version
        );
        return Ok(UnitStatus::Skipped);
    };

    // Patching
    manifest::patch_repository_url(staged.package_root(), repository_url)?;

    // Packaging: compression is CPU-bound, run it off the async runtime
    let out_path = staged.output_path();
    {
        let package_root = staged.package_root().to_path_buf();
        let out_path = out_path.clone();
        tokio::task::spawn_blocking(move || pack::pack_package_dir(&package_root, &out_path))
            .await
            .map_err(|e| MigrateError::Packaging(format!("packaging task failed: {}", e)))??;
    }

    if dry_run {
        debug!(
            "{}@{}: dry run, skipping publish",
            unit.module, unit.version
        );
        return Ok(UnitStatus::Skipped);
    }

    // Publishing
    let tarball = tokio::fs::read(&out_path)
        .await
        .map_err(|e| MigrateError::Disk(format!("reading {}: {}", out_path.display(), e)))?;

    let dest_name = target.endpoint().prefixed_name(&unit.module);
    let body = publish_body(&dest_name, &unit.version, &unit.record, &tarball);

    with_retry(
        max_retries,
        &format!("publish {}@{}", unit.module, unit.version),
        || target.publish(&unit.module, &unit.version, &body),
    )
    .await?;

    Ok(UnitStatus::Completed)
}
