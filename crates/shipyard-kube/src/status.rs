//! Persistence of installation status and finalizers

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{KubeError, Result};
use crate::installation::{ClusterInstallation, ClusterInstallationStatus, InstallPhase};

/// Writes what the orchestrator observed back to the installation object
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Replace the status subresource
    async fn write_status(
        &self,
        installation: &ClusterInstallation,
        status: &ClusterInstallationStatus,
    ) -> Result<()>;

    async fn add_finalizer(&self, installation: &ClusterInstallation, finalizer: &str)
    -> Result<()>;

    async fn remove_finalizer(
        &self,
        installation: &ClusterInstallation,
        finalizer: &str,
    ) -> Result<()>;
}

/// Status store backed by the Kubernetes API
pub struct KubeStatusStore {
    client: Client,
}

impl KubeStatusStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, installation: &ClusterInstallation) -> Result<Api<ClusterInstallation>> {
        let namespace = installation.namespace().ok_or_else(|| {
            KubeError::InvalidConfig(format!(
                "ClusterInstallation {} has no namespace",
                installation.name_any()
            ))
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    async fn patch_finalizers(
        &self,
        installation: &ClusterInstallation,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.api(installation)?
            .patch(
                &installation.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn write_status(
        &self,
        installation: &ClusterInstallation,
        status: &ClusterInstallationStatus,
    ) -> Result<()> {
        let patch = json!({ "status": status });
        self.api(installation)?
            .patch_status(
                &installation.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn add_finalizer(
        &self,
        installation: &ClusterInstallation,
        finalizer: &str,
    ) -> Result<()> {
        let current = self.api(installation)?.get(&installation.name_any()).await?;
        let mut finalizers = current.finalizers().to_vec();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(installation, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        installation: &ClusterInstallation,
        finalizer: &str,
    ) -> Result<()> {
        let current = match self.api(installation)?.get(&installation.name_any()).await {
            Ok(current) => current,
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let finalizers: Vec<String> = current
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();
        self.patch_finalizers(installation, finalizers).await
    }
}

/// Status store that keeps every write in memory
#[derive(Clone, Default)]
pub struct MemoryStatusStore {
    history: Arc<RwLock<Vec<ClusterInstallationStatus>>>,
    finalizers: Arc<RwLock<BTreeSet<String>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent status written
    pub fn last(&self) -> Option<ClusterInstallationStatus> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Every phase written, in order
    pub fn phases(&self) -> Vec<InstallPhase> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.phase)
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn finalizers(&self) -> Vec<String> {
        self.finalizers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Copy the last written status onto an installation, as a watch would
    pub fn observe(&self, installation: &mut ClusterInstallation) {
        if let Some(status) = self.last() {
            installation.status = Some(status);
        }
        installation.metadata.finalizers = Some(self.finalizers());
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn write_status(
        &self,
        _installation: &ClusterInstallation,
        status: &ClusterInstallationStatus,
    ) -> Result<()> {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status.clone());
        Ok(())
    }

    async fn add_finalizer(
        &self,
        _installation: &ClusterInstallation,
        finalizer: &str,
    ) -> Result<()> {
        self.finalizers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(finalizer.to_string());
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        _installation: &ClusterInstallation,
        finalizer: &str,
    ) -> Result<()> {
        self.finalizers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(finalizer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installation() -> ClusterInstallation {
        ClusterInstallation::from_yaml(
            "apiVersion: shipyard.dev/v1alpha1\nkind: ClusterInstallation\nmetadata: {name: main, namespace: platform}\nspec: {version: v1.5.0}\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_records_history() {
        let store = MemoryStatusStore::new();
        let mut installation = installation();

        for phase in [InstallPhase::Pending, InstallPhase::InstallingCertManager] {
            let status = ClusterInstallationStatus {
                phase,
                ..Default::default()
            };
            store.write_status(&installation, &status).await.unwrap();
        }
        store.add_finalizer(&installation, "shipyard.dev/cleanup").await.unwrap();

        assert_eq!(
            store.phases(),
            vec![InstallPhase::Pending, InstallPhase::InstallingCertManager]
        );
        store.observe(&mut installation);
        assert_eq!(installation.phase(), InstallPhase::InstallingCertManager);
        assert_eq!(installation.finalizers(), ["shipyard.dev/cleanup".to_string()]);

        store
            .remove_finalizer(&installation, "shipyard.dev/cleanup")
            .await
            .unwrap();
        assert!(store.finalizers().is_empty());
    }
}
