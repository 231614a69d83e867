//! Bundle resolution: reference → index entry → mirror → cached manifest.
//!
//! # Flow
//!
//! ```text
//! GET <proto>://<domain>/repositories/<path>/tags/<tag>   → BundleEntry
//! for url in entry.urls:
//!     GET url → bundle bytes
//!     (verify digest) → parse → write <cache>/<name>-<version>.json
//! ```
//!
//! Mirrors are tried in order and the first usable one wins. A mirror that
//! is unreachable, answers with an error status or serves bytes that do not
//! match the entry digest is skipped with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::bundle::Bundle;
use crate::config::HoistConfig;
use crate::digest::digest_bytes;
use crate::error::{RegistryError, RegistryResult};
use crate::index::BundleEntry;
use crate::reference::{BundleReference, BundleSource};
use crate::store::write_atomic;

const USER_AGENT_VALUE: &str = concat!("hoist/", env!("CARGO_PKG_VERSION"));

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Domain for references that name none.
    pub default_repository: String,

    /// Directory resolved manifests are written to.
    pub cache_dir: PathBuf,

    /// Skip mirrors whose bytes do not match the entry digest.
    pub verify_digest: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ResolverConfig {
    pub fn from_config(config: &HoistConfig) -> Self {
        Self {
            default_repository: config.default_repository.clone(),
            cache_dir: config.home_dir().cache(),
            verify_digest: config.verify_digest,
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_default_repository(mut self, domain: impl Into<String>) -> Self {
        self.default_repository = domain.into();
        self
    }

    pub fn with_verify_digest(mut self, verify: bool) -> Self {
        self.verify_digest = verify;
        self
    }
}

/// Resolves bundle references against remote repositories.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: reqwest::Client,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> RegistryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn from_config(config: &HoistConfig) -> RegistryResult<Self> {
        Self::new(ResolverConfig::from_config(config))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Path of the manifest to install: a local file as given, or a
    /// resolved reference.
    pub async fn locate(&self, source: &BundleSource) -> RegistryResult<PathBuf> {
        match source {
            BundleSource::File(path) => {
                debug!(path = %path.display(), "using local bundle file");
                Ok(path.clone())
            }
            BundleSource::Reference(reference) => self.resolve_reference(reference).await,
        }
    }

    /// Resolve a reference string to a cached manifest path.
    pub async fn resolve(&self, reference: &str) -> RegistryResult<PathBuf> {
        let reference = BundleReference::parse(reference)?;
        self.resolve_reference(&reference).await
    }

    pub async fn resolve_reference(&self, reference: &BundleReference) -> RegistryResult<PathBuf> {
        let reference = reference
            .clone()
            .with_default_domain(&self.config.default_repository);
        let lookup_url = reference.lookup_url(&self.config.default_repository);

        let entry = self.fetch_entry(&lookup_url).await?;
        debug!(
            name = %entry.name,
            version = %entry.version,
            mirrors = entry.urls.len(),
            "fetched index entry"
        );

        let base = repository_base(&reference);
        for url in &entry.urls {
            let url = absolute_url(base.as_ref(), url);
            let data = match self.fetch_mirror(&url).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(url = %url, error = %e, "mirror failed, trying next");
                    continue;
                }
            };

            if self.config.verify_digest && !entry.digest.is_empty() {
                let actual = digest_bytes(&data);
                if !actual.eq_ignore_ascii_case(&entry.digest) {
                    warn!(
                        url = %url,
                        expected = %entry.digest,
                        actual = %actual,
                        "mirror digest mismatch, trying next"
                    );
                    continue;
                }
            }

            let bundle = Bundle::from_slice(&data, &url)?;
            let path = self.cache_path(&bundle);
            self.write_cache(&path, &data).await?;

            info!(
                name = %bundle.name,
                version = %bundle.version,
                url = %url,
                path = %path.display(),
                "resolved bundle"
            );
            return Ok(path);
        }

        Err(RegistryError::MirrorsExhausted {
            name: entry.name,
            version: entry.version,
            urls: entry.urls,
        })
    }

    /// Fetch the index entry a tag URL points at.
    pub async fn fetch_entry(&self, url: &str) -> RegistryResult<BundleEntry> {
        debug!(url = %url, "fetching index entry");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| RegistryError::Network {
            message: format!("failed to read response body from {}: {}", url, e),
        })?;
        serde_json::from_slice(&body).map_err(|e| RegistryError::InvalidResponse {
            message: format!("invalid index entry from {}: {}", url, e),
        })
    }

    async fn fetch_mirror(&self, url: &str) -> RegistryResult<Vec<u8>> {
        debug!(url = %url, "fetching bundle");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| RegistryError::Network {
            message: format!("failed to read response body from {}: {}", url, e),
        })?;
        Ok(body.to_vec())
    }

    fn cache_path(&self, bundle: &Bundle) -> PathBuf {
        self.config.cache_dir.join(bundle.cache_file_name())
    }

    async fn write_cache(&self, path: &Path, data: &[u8]) -> RegistryResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::io("create directory", parent, e))?;
        }
        write_atomic(path, data).await
    }
}

/// `<proto>://<domain>/`, the base relative mirror URLs resolve against.
fn repository_base(reference: &BundleReference) -> Option<Url> {
    let domain = reference.domain()?;
    Url::parse(&format!("{}://{}/", reference.protocol(), domain)).ok()
}

fn absolute_url(base: Option<&Url>, url: &str) -> String {
    match Url::parse(url) {
        Ok(_) => url.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .and_then(|b| b.join(url).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string()),
        Err(_) => url.to_string(),
    }
}
