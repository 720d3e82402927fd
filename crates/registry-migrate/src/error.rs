//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registry could not be reached (network failure, timeout, 5xx).
    #[error("Registry unavailable at {url}: {message}")]
    RegistryUnavailable { url: String, message: String },

    /// Module does not exist on the registry (404 or empty metadata document).
    #[error("Module {module} not found on registry {url}")]
    RegistryNotFound { url: String, module: String },

    /// Authentication or authorization failure against a registry.
    #[error("Registry auth failed for {url}: {message}")]
    RegistryAuth { url: String, message: String },

    /// Tarball download failed (network, timeout, non-2xx).
    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    /// Downloaded archive could not be extracted.
    #[error("Corrupt archive {path}: {message}")]
    ArchiveCorrupt { path: String, message: String },

    /// Local staging storage failure (space, permissions).
    #[error("Disk error: {0}")]
    Disk(String),

    /// No manifest file at the expected location in the extracted package.
    #[error("Manifest not found at {0}")]
    ManifestNotFound(String),

    /// Manifest exists but could not be parsed.
    #[error("Malformed manifest at {path}: {message}")]
    ManifestMalformed { path: String, message: String },

    /// Repackaging the patched package directory failed.
    #[error("Packaging failed: {0}")]
    Packaging(String),

    /// Version already exists on the destination registry.
    #[error("Publish conflict: {module}@{version} already exists on destination")]
    PublishConflict { module: String, version: String },

    /// Destination registry rejected the publish request.
    #[error("Publish rejected for {module}@{version}: {message}")]
    PublishRejected {
        module: String,
        version: String,
        message: String,
    },

    /// Run finished but one or more versions failed to migrate.
    #[error("Migration failed for {module}: {message}")]
    Migration { module: String, message: String },

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a RegistryUnavailable error.
    pub fn unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::RegistryUnavailable {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a Download error.
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a Migration error.
    pub fn migration(module: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Migration {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Check if this error class is worth retrying with backoff.
    /// Only transient transport failures qualify; everything else is
    /// surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrateError::RegistryUnavailable { .. } | MigrateError::Download { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::RegistryUnavailable { .. }
            | MigrateError::RegistryNotFound { .. }
            | MigrateError::RegistryAuth { .. } => 2,
            MigrateError::Migration { .. } => 3,
            MigrateError::Io(_) | MigrateError::Disk(_) => 7,
            MigrateError::Cancelled => 130,
            _ => 4,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_unavailable() {
        assert!(MigrateError::unavailable("http://r", "timed out").is_retryable());
    }

    #[test]
    fn test_retryable_download() {
        assert!(MigrateError::download("http://r/a.tgz", "502").is_retryable());
    }

    #[test]
    fn test_not_retryable_auth() {
        let err = MigrateError::RegistryAuth {
            url: "http://r".into(),
            message: "401".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_retryable_conflict() {
        let err = MigrateError::PublishConflict {
            module: "left-pad".into(),
            version: "1.0.0".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 1);
        assert_eq!(MigrateError::unavailable("u", "m").exit_code(), 2);
        assert_eq!(MigrateError::migration("m", "1 failed").exit_code(), 3);
        assert_eq!(
            MigrateError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).exit_code(),
            7
        );
    }
}
