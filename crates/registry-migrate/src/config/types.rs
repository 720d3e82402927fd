//! Configuration type definitions with auto-tuning based on system resources.

use base64::Engine;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Source registry endpoint (read side).
    pub source: EndpointConfig,

    /// Destination registry endpoint (publish side).
    pub target: EndpointConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// One registry endpoint plus the credentials attached to every request
/// against it. Source and destination each get their own instance; the two
/// are never conflated.
#[derive(Clone, Deserialize)]
pub struct EndpointConfig {
    /// Registry base URL.
    pub url: String,

    /// Optional name prefix (namespace/scope) prepended to module names.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Basic-auth username (paired with `password`).
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in milliseconds (default: 3000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl EndpointConfig {
    /// Module name with the endpoint's prefix applied.
    pub fn prefixed_name(&self, module: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, module),
            None => module.to_string(),
        }
    }

    /// Metadata/publish URL for a module on this endpoint.
    pub fn module_url(&self, module: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.prefixed_name(module)
        )
    }

    /// Request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Authorization header value for this endpoint, if credentials are set.
    pub fn auth_header(&self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(format!("Bearer {}", token));
        }
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
            return Some(format!("Basic {}", encoded));
        }
        None
    }
}

// Credentials must never reach logs; Debug renders them redacted.
impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("prefix", &self.prefix)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Migration behavior configuration.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set".
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MigrationConfig {
    /// Repository URL written into each migrated version's manifest.
    #[serde(default)]
    pub repository_url: Option<String>,

    /// Number of versions migrated in parallel within one module.
    /// Auto-tuned based on CPU cores if not set.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Retry attempts for transient registry/download failures (default: 3).
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Workers: transfers are network-bound, so scale gently with cores
        if self.workers.is_none() {
            let workers = (resources.cpu_cores / 2).clamp(2, 8);
            self.workers = Some(workers);
        }
        self
    }

    /// Effective worker count.
    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(2)
    }

    /// Effective retry budget for transient failures.
    pub fn get_max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(3)
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            url: "https://registry.example.com".to_string(),
            prefix: None,
            token: Some("s3cret".to_string()),
            username: None,
            password: None,
            timeout_ms: 3000,
        }
    }

    #[test]
    fn test_module_url_without_prefix() {
        assert_eq!(
            endpoint().module_url("left-pad"),
            "https://registry.example.com/left-pad"
        );
    }

    #[test]
    fn test_module_url_with_prefix_and_trailing_slash() {
        let mut ep = endpoint();
        ep.url = "https://registry.example.com/".to_string();
        ep.prefix = Some("@acme".to_string());
        assert_eq!(
            ep.module_url("left-pad"),
            "https://registry.example.com/@acme/left-pad"
        );
    }

    #[test]
    fn test_bearer_auth_header() {
        assert_eq!(endpoint().auth_header().unwrap(), "Bearer s3cret");
    }

    #[test]
    fn test_basic_auth_header() {
        let mut ep = endpoint();
        ep.token = None;
        ep.username = Some("alice".to_string());
        ep.password = Some("wonder".to_string());
        // base64("alice:wonder")
        assert_eq!(ep.auth_header().unwrap(), "Basic YWxpY2U6d29uZGVy");
    }

    #[test]
    fn test_no_auth_header_without_credentials() {
        let mut ep = endpoint();
        ep.token = None;
        assert!(ep.auth_header().is_none());
    }

    #[test]
    fn test_workers_auto_tuned_from_cores() {
        let resources = SystemResources {
            total_memory_gb: 16.0,
            cpu_cores: 12,
        };
        let config = MigrationConfig::default().with_auto_tuning(&resources);
        assert_eq!(config.get_workers(), 6);
    }

    #[test]
    fn test_workers_explicit_value_kept() {
        let resources = SystemResources {
            total_memory_gb: 16.0,
            cpu_cores: 12,
        };
        let config = MigrationConfig {
            workers: Some(1),
            ..Default::default()
        }
        .with_auto_tuning(&resources);
        assert_eq!(config.get_workers(), 1);
    }
}
