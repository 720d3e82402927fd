//! # registry-migrate
//!
//! Replicate missing package versions from a source package registry to a
//! destination registry.
//!
//! For each requested module the library:
//!
//! - **Diffs** the version sets of both registries (live registry state is
//!   the sole source of truth for "already migrated")
//! - **Stages** each missing version's tarball in a scoped temp directory
//! - **Patches** the manifest's repository URL
//! - **Repackages** and **publishes** the artifact to the destination
//!
//! Versions within a module migrate under a bounded worker pool; failures
//! are isolated per version.
//!
//! ## Example
//!
//! ```rust,no_run
//! use registry_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> registry_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let modules = vec!["left-pad".to_string()];
//!     let result = orchestrator
//!         .run(&modules, CancellationToken::new(), false)
//!         .await?;
//!     println!("Migrated {} versions", result.versions_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;

// Re-exports for convenient access
pub use config::{Config, EndpointConfig, MigrationConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, ModuleReport, Orchestrator, VersionFailure};
pub use pipeline::{MigrationUnit, UnitStatus};
pub use registry::{Packument, RegistryClient, VersionRecord};
