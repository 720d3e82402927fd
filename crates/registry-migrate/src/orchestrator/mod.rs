//! Migration orchestrator - drives per-module migration end-to-end.

use crate::config::Config;
use crate::diff::missing_versions;
use crate::error::{MigrateError, Result};
use crate::pipeline::{self, MigrationUnit, UnitStatus};
use crate::registry::{with_retry, RegistryClient, VersionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Migration orchestrator. Holds one stateless registry client per
/// endpoint; modules are processed sequentially, versions within a module
/// under a bounded worker pool.
pub struct Orchestrator {
    config: Config,
    source: Arc<RegistryClient>,
    target: Arc<RegistryClient>,
}

/// Failure of one version's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionFailure {
    /// Version identifier.
    pub version: String,

    /// What went wrong.
    pub error: String,
}

/// Outcome of one module's migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReport {
    /// Module name.
    pub module: String,

    /// Versions present at source and absent at destination.
    pub considered: usize,

    /// Versions published to the destination.
    pub migrated: Vec<String>,

    /// Versions processed without publishing (dry run).
    pub skipped: Vec<String>,

    /// Versions whose pipeline failed.
    pub failed: Vec<VersionFailure>,

    /// Module-level metadata read failure, if the module aborted before
    /// any version was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleReport {
    fn empty(module: &str) -> Self {
        Self {
            module: module.to_string(),
            considered: 0,
            migrated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            error: None,
        }
    }

    fn aborted(module: &str, error: &MigrateError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(module)
        }
    }

    /// Whether anything in this module went wrong.
    pub fn has_failures(&self) -> bool {
        self.error.is_some() || !self.failed.is_empty()
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Final status: completed, completed_with_failures, or cancelled.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Modules requested.
    pub modules_total: usize,

    /// Modules that aborted or had failing versions.
    pub modules_failed: usize,

    /// Versions found missing on the destination across all modules.
    pub versions_considered: usize,

    /// Versions published.
    pub versions_migrated: usize,

    /// Versions intentionally not published (dry run).
    pub versions_skipped: usize,

    /// Versions that failed.
    pub versions_failed: usize,

    /// Per-module reports.
    pub modules: Vec<ModuleReport>,
}

impl MigrationResult {
    /// Whether any module or version failed.
    pub fn has_failures(&self) -> bool {
        self.modules_failed > 0
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create a new orchestrator from validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        let source = RegistryClient::new(config.source.clone())?;
        let target = RegistryClient::new(config.target.clone())?;

        Ok(Self {
            config,
            source: Arc::new(source),
            target: Arc::new(target),
        })
    }

    /// Run the migration for the given modules.
    ///
    /// Modules are processed sequentially and fully awaited; the returned
    /// result is computed only after every spawned unit has reached a
    /// terminal state. Per-version failures are isolated to their unit,
    /// metadata-read failures abort their module only. Fails upfront with a
    /// configuration error when publishing is impossible.
    pub async fn run(
        &self,
        modules: &[String],
        cancel: CancellationToken,
        dry_run: bool,
    ) -> Result<MigrationResult> {
        if !dry_run && self.config.migration.repository_url.is_none() {
            return Err(MigrateError::Config(
                "migration.repository_url is required (use --dry-run to stage without publishing)"
                    .into(),
            ));
        }

        let started_at = Utc::now();
        info!("Starting migration of {} module(s)", modules.len());

        let mut reports = Vec::with_capacity(modules.len());
        let mut first_read_error = None;
        let mut read_errors = 0usize;

        for module in modules {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping before {}", module);
                break;
            }

            match self.migrate_module(module, &cancel, dry_run).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("{}: {}", module, e.format_detailed());
                    read_errors += 1;
                    reports.push(ModuleReport::aborted(module, &e));
                    if first_read_error.is_none() {
                        first_read_error = Some(e);
                    }
                }
            }
        }

        // When every module aborted at the metadata-read stage there is
        // nothing meaningful to report per version; surface the registry
        // error itself as the run failure.
        if !modules.is_empty() && read_errors == modules.len() {
            if let Some(e) = first_read_error {
                return Err(e);
            }
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let modules_failed = reports.iter().filter(|r| r.has_failures()).count();
        let versions_considered = reports.iter().map(|r| r.considered).sum();
        let versions_migrated = reports.iter().map(|r| r.migrated.len()).sum();
        let versions_skipped = reports.iter().map(|r| r.skipped.len()).sum();
        let versions_failed = reports.iter().map(|r| r.failed.len()).sum();

        let status = if cancel.is_cancelled() {
            "cancelled"
        } else if modules_failed > 0 {
            "completed_with_failures"
        } else {
            "completed"
        };

        let result = MigrationResult {
            status: status.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            modules_total: modules.len(),
            modules_failed,
            versions_considered,
            versions_migrated,
            versions_skipped,
            versions_failed,
            modules: reports,
        };

        info!(
            "Migration {}: {} module(s), {} migrated, {} skipped, {} failed in {:.1}s",
            result.status,
            result.modules_total,
            result.versions_migrated,
            result.versions_skipped,
            result.versions_failed,
            result.duration_seconds
        );

        Ok(result)
    }

    /// Compute the versions that would be migrated for one module, without
    /// transferring anything.
    pub async fn diff_module(&self, module: &str) -> Result<Vec<String>> {
        let (source, target) = self.read_both(module).await?;
        Ok(missing_versions(&source, &target))
    }

    /// Read source and destination metadata concurrently. Neither side's
    /// read may be skipped; no partial diff is meaningful without both.
    async fn read_both(
        &self,
        module: &str,
    ) -> Result<(
        BTreeMap<String, VersionRecord>,
        BTreeMap<String, VersionRecord>,
    )> {
        let retries = self.config.migration.get_max_retries();

        let source_label = format!("{}: source metadata", module);
        let target_label = format!("{}: destination metadata", module);
        let (source, target) = tokio::try_join!(
            with_retry(retries, &source_label, || self.source.fetch_packument(module)),
            with_retry(retries, &target_label, || self.target.fetch_packument(module)),
        )?;

        Ok((source.versions, target.versions))
    }

    /// Migrate one module: read both sides, diff, then run each missing
    /// version through the pipeline under the worker pool.
    async fn migrate_module(
        &self,
        module: &str,
        cancel: &CancellationToken,
        dry_run: bool,
    ) -> Result<ModuleReport> {
        info!("{}: comparing registries", module);
        let (source_versions, target_versions) = self.read_both(module).await?;

        let versions = missing_versions(&source_versions, &target_versions);
        if versions.is_empty() {
            info!("{}: no versions differ, nothing to migrate", module);
            return Ok(ModuleReport::empty(module));
        }

        let units: Vec<MigrationUnit> = versions
            .iter()
            .filter_map(|version| {
                source_versions.get(version).map(|record| MigrationUnit {
                    module: module.to_string(),
                    version: version.clone(),
                    record: record.clone(),
                })
            })
            .collect();

        let workers = self.config.migration.get_workers();
        let retries = self.config.migration.get_max_retries();
        let total = units.len();
        info!(
            "{}: migrating {} version(s) with {} workers",
            module, total, workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(total);

        for (index, unit) in units.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("{}: cancellation requested, not spawning new units", module);
                break;
            }

            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let source = self.source.clone();
            let target = self.target.clone();
            let repository_url = self.config.migration.repository_url.clone();
            let version = unit.version.clone();

            let handle = tokio::spawn(async move {
                info!(
                    "{}: migrating {} ({} of {})",
                    unit.module,
                    unit.version,
                    index + 1,
                    total
                );
                let result = pipeline::run_unit(
                    &source,
                    &target,
                    &unit,
                    repository_url.as_deref(),
                    retries,
                    dry_run,
                )
                .await;
                drop(permit);
                result
            });

            handles.push((version, handle));
        }

        let mut report = ModuleReport::empty(module);
        report.considered = total;

        for (version, handle) in handles {
            match handle.await {
                Ok(Ok(UnitStatus::Completed)) => {
                    info!("{}: {} migrated", module, version);
                    report.migrated.push(version);
                }
                Ok(Ok(UnitStatus::Skipped)) => {
                    info!("{}: {} skipped (not published)", module, version);
                    report.skipped.push(version);
                }
                Ok(Err(e)) => {
                    error!("{}: {} failed - {}", module, version, e);
                    report.failed.push(VersionFailure {
                        version,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("{}: {} task panicked - {}", module, version, e);
                    report.failed.push(VersionFailure {
                        version,
                        error: format!("task panicked: {}", e),
                    });
                }
            }
        }

        info!(
            "{}: {} considered, {} migrated, {} skipped, {} failed",
            module,
            report.considered,
            report.migrated.len(),
            report.skipped.len(),
            report.failed.len()
        );

        Ok(report)
    }
}
