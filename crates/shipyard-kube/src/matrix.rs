//! Compatibility matrix fetching
//!
//! The matrix is a JSON object `{minPlatformVersion: schemaVersion}`
//! published next to platform releases. [`HttpMatrixFetcher`] keeps the
//! last matrix it fetched and serves it when the endpoint is unreachable.

use async_trait::async_trait;
use shipyard_core::{LATEST_SCHEMA_VERSION, VersionMatrix, is_develop};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::{KubeError, Result};

/// Source of the compatibility matrix
#[async_trait]
pub trait MatrixFetcher: Send + Sync {
    async fn fetch(&self) -> Result<VersionMatrix>;
}

/// Resolve the schema version a platform version needs
///
/// `develop` resolves to [`LATEST_SCHEMA_VERSION`] without fetching.
pub async fn resolve_schema_version(fetcher: &dyn MatrixFetcher, target: &str) -> Result<String> {
    if is_develop(target) {
        return Ok(LATEST_SCHEMA_VERSION.to_string());
    }

    let matrix = fetcher.fetch().await?;
    let schema = matrix
        .resolve(target)
        .map_err(|e| KubeError::VersionMatrix(e.to_string()))?;
    tracing::debug!(target, schema = %schema, "resolved schema version");
    Ok(schema)
}

/// Fetches the matrix over HTTP with a last-good fallback
pub struct HttpMatrixFetcher {
    client: reqwest::Client,
    url: String,
    cached: RwLock<Option<VersionMatrix>>,
}

impl HttpMatrixFetcher {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            cached: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last matrix fetched successfully
    pub fn cached(&self) -> Option<VersionMatrix> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_remote(&self) -> Result<VersionMatrix> {
        let raw: BTreeMap<String, String> = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(VersionMatrix::from_map(&raw)?)
    }
}

#[async_trait]
impl MatrixFetcher for HttpMatrixFetcher {
    async fn fetch(&self) -> Result<VersionMatrix> {
        match self.fetch_remote().await {
            Ok(matrix) => {
                tracing::debug!(url = %self.url, entries = matrix.len(), "fetched version matrix");
                *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(matrix.clone());
                Ok(matrix)
            }
            Err(e) => match self.cached() {
                Some(matrix) => {
                    tracing::warn!(url = %self.url, error = %e, "matrix fetch failed, using cached copy");
                    Ok(matrix)
                }
                None => Err(KubeError::VersionMatrix(format!(
                    "failed to fetch {}: {}",
                    self.url, e
                ))),
            },
        }
    }
}

/// Fixed matrix for tests and offline use
#[derive(Debug, Default)]
pub struct StaticMatrix {
    matrix: Option<VersionMatrix>,
    fetches: AtomicUsize,
}

impl StaticMatrix {
    pub fn new(matrix: VersionMatrix) -> Self {
        Self {
            matrix: Some(matrix),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Build from `(minPlatformVersion, schemaVersion)` pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Self::new(VersionMatrix::from_map(&raw)?))
    }

    /// A matrix that is never available
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatrixFetcher for StaticMatrix {
    async fn fetch(&self) -> Result<VersionMatrix> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.matrix
            .clone()
            .ok_or_else(|| KubeError::VersionMatrix("no matrix available".to_string()))
    }
}
