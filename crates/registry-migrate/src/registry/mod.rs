//! HTTP registry client: metadata reads, tarball downloads and publishes.

mod types;

pub use types::{publish_body, Packument, VersionRecord};

use crate::config::EndpointConfig;
use crate::error::{MigrateError, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Stateless client for one registry endpoint. Holds the endpoint
/// configuration and a reqwest client with the endpoint's request timeout;
/// credentials are attached per request and never shared across endpoints.
pub struct RegistryClient {
    endpoint: EndpointConfig,
    http: Client,
}

impl RegistryClient {
    /// Create a client for one endpoint.
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("registry-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { endpoint, http })
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.endpoint.auth_header() {
            Some(header) => request.header(AUTHORIZATION, header),
            None => request,
        }
    }

    /// Fetch the full metadata document for a module.
    ///
    /// An empty response body or a document without a versions member counts
    /// as an absent module; a document with zero versions is valid.
    pub async fn fetch_packument(&self, module: &str) -> Result<Packument> {
        let url = self.endpoint.module_url(module);
        debug!("GET {}", url);

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(|e| MigrateError::unavailable(&url, e.to_string()))?;

        let status = response.status();
        check_read_status(status, &url, module)?;

        let body = response
            .text()
            .await
            .map_err(|e| MigrateError::unavailable(&url, e.to_string()))?;

        if body.trim().is_empty() {
            return Err(MigrateError::RegistryNotFound {
                url,
                module: module.to_string(),
            });
        }

        let doc: types::PackumentDoc = serde_json::from_str(&body)?;
        doc.into_packument().ok_or(MigrateError::RegistryNotFound {
            url,
            module: module.to_string(),
        })
    }

    /// Download an artifact tarball to a local file.
    pub async fn download_tarball(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("GET {} -> {}", url, dest.display());

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| MigrateError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MigrateError::download(url, format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MigrateError::download(url, e.to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| MigrateError::Disk(format!("writing {}: {}", dest.display(), e)))?;

        Ok(())
    }

    /// Publish one version: PUT the npm publish body (metadata plus base64
    /// artifact attachment) to the module URL. A 2xx response is the
    /// authoritative signal that the version is durably present on the
    /// destination.
    pub async fn publish(
        &self,
        module: &str,
        version: &str,
        body: &serde_json::Value,
    ) -> Result<()> {
        let url = self.endpoint.module_url(module);
        debug!("PUT {}", url);

        let response = self
            .authorized(self.http.put(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| MigrateError::unavailable(&url, e.to_string()))?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(MigrateError::PublishConflict {
                module: module.to_string(),
                version: version.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MigrateError::RegistryAuth {
                url,
                message: format!("HTTP {}", status),
            }),
            s if s.is_client_error() => {
                let detail = response.text().await.unwrap_or_default();
                Err(MigrateError::PublishRejected {
                    module: module.to_string(),
                    version: version.to_string(),
                    message: format!("HTTP {}: {}", status, detail.trim()),
                })
            }
            _ => Err(MigrateError::unavailable(&url, format!("HTTP {}", status))),
        }
    }
}

fn check_read_status(status: StatusCode, url: &str, module: &str) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(MigrateError::RegistryNotFound {
            url: url.to_string(),
            module: module.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MigrateError::RegistryAuth {
            url: url.to_string(),
            message: format!("HTTP {}", status),
        }),
        _ => Err(MigrateError::unavailable(url, format!("HTTP {}", status))),
    }
}

/// Run a fallible operation, retrying transient failures with exponential
/// backoff. Non-retryable errors surface immediately.
pub async fn with_retry<T, F, Fut>(max_retries: u32, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = Duration::from_millis(500u64 << (attempt - 1).min(6));
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    operation, attempt, max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
