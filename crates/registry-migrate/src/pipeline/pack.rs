//! Artifact repackaging: compress a patched package directory back into a
//! registry-ready tarball.

use crate::error::{MigrateError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use tar::Builder;
use tracing::debug;

/// Compress `package_root` into a gzipped tarball at `out_path`. The archive
/// keeps the top-level `package/` directory convention the registry unpacks,
/// matching the layout of the source artifact.
pub fn pack_package_dir(package_root: &Path, out_path: &Path) -> Result<()> {
    let file = File::create(out_path)
        .map_err(|e| MigrateError::Packaging(format!("creating {}: {}", out_path.display(), e)))?;

    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = Builder::new(encoder);

    tar.append_dir_all("package", package_root)
        .map_err(|e| MigrateError::Packaging(format!("archiving {}: {}", package_root.display(), e)))?;

    let encoder = tar
        .into_inner()
        .map_err(|e| MigrateError::Packaging(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| MigrateError::Packaging(e.to_string()))?;

    debug!(
        "packaged {} -> {}",
        package_root.display(),
        out_path.display()
    );
    Ok(())
}
