//! Artifact staging: download one version's tarball and extract it into a
//! uniquely named temporary directory.

use crate::error::{MigrateError, Result};
use crate::registry::{with_retry, RegistryClient};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;

/// A staged artifact: the downloaded tarball and its extracted file tree.
/// Everything lives inside one temp directory that is removed when this
/// value is dropped, on success, failure and cancellation alike.
pub struct StagedArtifact {
    tmp: TempDir,
    tarball_path: PathBuf,
    package_root: PathBuf,
}

impl StagedArtifact {
    /// Downloaded source tarball.
    pub fn tarball_path(&self) -> &Path {
        &self.tarball_path
    }

    /// Extracted package root (the archive's top-level `package/` directory).
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Where the repackaged tarball goes; inside the staging directory so it
    /// shares its cleanup.
    pub fn output_path(&self) -> PathBuf {
        self.tmp.path().join("publish.tgz")
    }
}

/// Download and extract one version's artifact. The staging directory name
/// is scoped to module and version, so concurrent units never collide.
pub async fn stage(
    client: &RegistryClient,
    module: &str,
    version: &str,
    tarball_url: &str,
    max_retries: u32,
) -> Result<StagedArtifact> {
    let tmp = tempfile::Builder::new()
        .prefix(&format!(
            "registry-migrate-{}-{}-",
            sanitize(module),
            sanitize(version)
        ))
        .tempdir()
        .map_err(|e| MigrateError::Disk(format!("creating staging dir: {}", e)))?;

    let tarball_path = tmp.path().join(format!("{}.tgz", sanitize(version)));

    with_retry(max_retries, &format!("download {}@{}", module, version), || {
        client.download_tarball(tarball_url, &tarball_path)
    })
    .await?;

    let unpack_dir = tmp.path().join("unpacked");
    debug!(
        "{}@{}: extracting {} into {}",
        module,
        version,
        tarball_path.display(),
        unpack_dir.display()
    );

    // Extraction is synchronous; run it off the async runtime.
    let tarball = tarball_path.clone();
    let dest = unpack_dir.clone();
    tokio::task::spawn_blocking(move || extract_tarball(&tarball, &dest))
        .await
        .map_err(|e| MigrateError::Disk(format!("extraction task failed: {}", e)))??;

    Ok(StagedArtifact {
        tmp,
        tarball_path,
        package_root: unpack_dir.join("package"),
    })
}

/// Extract a gzipped tarball into `dest`.
pub(crate) fn extract_tarball(tarball: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .map_err(|e| MigrateError::Disk(format!("creating {}: {}", dest.display(), e)))?;

    let file = File::open(tarball)
        .map_err(|e| MigrateError::Disk(format!("opening {}: {}", tarball.display(), e)))?;

    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .map_err(|e| MigrateError::ArchiveCorrupt {
            path: tarball.display().to_string(),
            message: e.to_string(),
        })?;

    Ok(())
}

/// Staging dir/file names must stay filesystem-safe; module names can carry
/// scope separators.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
