//! Registry HTTP client
//!
//! A shared blocking client for the npm-compatible registry. Manifest
//! lookups go through the two-tier cache; tarball downloads return the
//! response stream so extraction can decode it without buffering.

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheError, ManifestCache};
use crate::registry::Manifest;
use crate::version;

/// Default registry endpoint.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Wall-clock limit covering each request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on error-body snippets carried in errors.
const BODY_SNIPPET_LIMIT: usize = 1000;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the registry
    #[error("Registry returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Response body was not a valid manifest
    #[error("Failed to decode manifest: {source}; body: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    /// Cache initialization failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RegistryError {
    /// Whether this error is a registry 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::Status { status: 404, .. })
    }
}

/// Client for the package registry.
///
/// Cheap to clone through `Arc`; the inner `reqwest` client pools idle
/// connections and is safe for concurrent use across resolver workers.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    cache: Arc<ManifestCache>,
}

impl RegistryClient {
    /// Create a client against the default registry.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_registry(DEFAULT_REGISTRY)
    }

    /// Create a client against a custom registry endpoint.
    pub fn with_registry(base_url: &str) -> Result<Self, RegistryError> {
        let cache = Arc::new(ManifestCache::new()?);
        Self::with_registry_and_cache(base_url, cache)
    }

    /// Create a client with an explicit cache handle.
    pub fn with_registry_and_cache(
        base_url: &str,
        cache: Arc<ManifestCache>,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("tidy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// The manifest cache backing this client.
    pub fn cache(&self) -> &Arc<ManifestCache> {
        &self.cache
    }

    /// Fetch the manifest for `name` at `range`.
    ///
    /// The range is narrowed to a fetchable tag first; both cache tiers
    /// are consulted before the network. A fresh fetch lands in memory
    /// synchronously and on disk in the background.
    pub fn manifest(&self, name: &str, range: &str) -> Result<Manifest, RegistryError> {
        let tag = version::normalize(range);

        if let Some(manifest) = self.cache.get(name, &tag) {
            return Ok(manifest);
        }

        let url = format!("{}/{}/{}", self.base_url, name, tag);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
                body: snippet(&body),
            });
        }

        let manifest: Manifest =
            serde_json::from_str(&body).map_err(|source| RegistryError::Decode {
                source,
                body: snippet(&body),
            })?;

        self.cache.insert(name, &tag, manifest.clone());
        Ok(manifest)
    }

    /// Open a streaming download of a tarball.
    pub fn download(&self, url: &str) -> Result<Response, RegistryError> {
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: snippet(&body),
            });
        }

        Ok(response)
    }
}

/// Truncate a response body for inclusion in an error message.
fn snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LIMIT {
        return body.to_string();
    }

    let mut end = BODY_SNIPPET_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
