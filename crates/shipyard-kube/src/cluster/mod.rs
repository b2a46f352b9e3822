//! Cluster collaborator
//!
//! Every network call the components make against the Kubernetes API goes
//! through [`ClusterOps`]:
//! - **KubeCluster**: the real API server, via Server-Side Apply
//! - **MockCluster**: in-memory objects and pods for tests and offline runs

mod api;
mod mock;

pub use api::KubeCluster;
pub use mock::{ClusterOperationCounts, MockCluster};

use async_trait::async_trait;
use shipyard_core::{ManifestBundle, Resource};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::resources::OperationSummary;

/// Metadata of a live object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Cluster operations the components depend on
///
/// All calls are fallible and may be redelivered; implementations must be
/// Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Metadata of the live object a resource refers to, None when absent
    async fn metadata(&self, resource: &Resource) -> Result<Option<LiveMetadata>>;

    /// Apply a bundle with forced Server-Side Apply
    async fn apply(&self, bundle: &ManifestBundle) -> Result<OperationSummary>;

    /// Delete a bundle; missing objects are skipped, not failed
    async fn delete(&self, bundle: &ManifestBundle) -> Result<OperationSummary>;

    /// Merge labels into an existing object
    ///
    /// Returns false when the object does not exist. Other labels and the
    /// rest of the object are left as they are.
    async fn label(&self, resource: &Resource, labels: &BTreeMap<String, String>)
    -> Result<bool>;

    /// Create a namespace with labels unless it exists
    ///
    /// Returns whether it was created. An existing namespace is never
    /// modified.
    async fn create_namespace(&self, name: &str, labels: &BTreeMap<String, String>)
    -> Result<bool>;

    /// Delete a namespace and everything in it
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Whether a pod whose name starts with `prefix` is Running in `namespace`
    async fn pod_running(&self, namespace: &str, prefix: &str) -> Result<bool>;

    /// Whether a CRD exists
    async fn crd_exists(&self, name: &str) -> Result<bool>;

    /// Whether a CRD exists and reports the Established condition
    async fn crd_established(&self, name: &str) -> Result<bool>;

    /// Decoded value of one Secret key
    async fn secret_value(&self, namespace: &str, name: &str, key: &str)
    -> Result<Option<String>>;

    /// Whether the object a resource refers to exists
    async fn exists(&self, resource: &Resource) -> Result<bool> {
        Ok(self.metadata(resource).await?.is_some())
    }
}
