//! ClusterOps against a real API server

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    Client,
    api::{Api, DeleteParams, ListParams, PostParams},
};
use shipyard_core::{ManifestBundle, Resource};
use std::collections::BTreeMap;

use super::{ClusterOps, LiveMetadata};
use crate::error::{KubeError, Result};
use crate::resources::{OperationSummary, ResourceManager};

/// Cluster operations backed by the Kubernetes API
pub struct KubeCluster {
    client: Client,
    resources: ResourceManager,
}

impl KubeCluster {
    /// Create a new KubeCluster, running API discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let resources = ResourceManager::new(client.clone()).await?;
        Ok(Self { client, resources })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn is_crd_established(crd: &CustomResourceDefinition) -> bool {
        crd.status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Established" && c.status == "True")
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn metadata(&self, resource: &Resource) -> Result<Option<LiveMetadata>> {
        let live = self.resources.get(resource).await?;
        Ok(live.map(|obj| LiveMetadata {
            labels: obj.metadata.labels.unwrap_or_default(),
            annotations: obj.metadata.annotations.unwrap_or_default(),
        }))
    }

    async fn apply(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        self.resources.apply_bundle(bundle).await
    }

    async fn delete(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        self.resources.delete_bundle(bundle).await
    }

    async fn label(
        &self,
        resource: &Resource,
        labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        self.resources.label(resource, labels).await
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(name).await?.is_some() {
            return Ok(false);
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                tracing::info!(namespace = name, "created namespace");
                Ok(true)
            }
            // created concurrently
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                tracing::info!(namespace = name, "deleted namespace");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    async fn pod_running(&self, namespace: &str, prefix: &str) -> Result<bool> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default()).await?;

        Ok(list.items.iter().any(|pod| {
            let name_matches = pod
                .metadata
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix));
            let running = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .map(|phase| phase == "Running")
                .unwrap_or(false);
            name_matches && running
        }))
    }

    async fn crd_exists(&self, name: &str) -> Result<bool> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn crd_established(&self, name: &str) -> Result<bool> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api
            .get_opt(name)
            .await?
            .is_some_and(|crd| Self::is_crd_established(&crd)))
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
            .or_else(|| {
                secret
                    .string_data
                    .as_ref()
                    .and_then(|data| data.get(key))
                    .cloned()
            });
        Ok(value)
    }
}
