//! Configuration validation.

use super::{Config, EndpointConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint(&config.source, "source")?;
    validate_endpoint(&config.target, "target")?;

    // Cannot migrate a namespace onto itself
    if config.source.url.trim_end_matches('/') == config.target.url.trim_end_matches('/')
        && config.source.prefix == config.target.prefix
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same registry endpoint".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_endpoint(endpoint: &EndpointConfig, side: &str) -> Result<()> {
    if endpoint.url.is_empty() {
        return Err(MigrateError::Config(format!("{}.url is required", side)));
    }
    if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
        return Err(MigrateError::Config(format!(
            "{}.url must be an http(s) URL, got '{}'",
            side, endpoint.url
        )));
    }
    if endpoint.timeout_ms == 0 {
        return Err(MigrateError::Config(format!(
            "{}.timeout_ms must be at least 1",
            side
        )));
    }
    if endpoint.auth_header().is_none() {
        return Err(MigrateError::Config(format!(
            "{} credentials are required (token, or username and password)",
            side
        )));
    }
    Ok(())
}
