//! Applying and deleting resource bundles
//!
//! - Server-Side Apply with forced field ownership, so re-applying a bundle
//!   over a partially present install converges instead of conflicting
//! - Dynamic resource handling through API discovery
//! - Category ordering for apply (dependencies first) and delete (reverse)

use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::json;
use shipyard_core::{ManifestBundle, Resource};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "shipyard";

/// Resource categories in apply order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    /// CustomResourceDefinition - installed first
    Crd = 0,
    /// Namespace - created before namespace-scoped resources
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// NetworkPolicy, Service, Ingress
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    /// HorizontalPodAutoscaler, PodDisruptionBudget
    Autoscaling = 60,
    /// Webhook configurations, after the services they call
    Admission = 65,
    /// Custom resources
    CustomResource = 70,
    /// Everything else
    Other = 100,
}

impl ResourceCategory {
    /// Categorize a resource by its kind and group
    pub fn of(resource: &Resource) -> Self {
        match resource.kind() {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            "ValidatingWebhookConfiguration" | "MutatingWebhookConfiguration" | "APIService" => {
                Self::Admission
            }
            _ if is_custom_group(resource.group()) => Self::CustomResource,
            _ => Self::Other,
        }
    }
}

/// Whether an API group is served by a CRD rather than the API server
fn is_custom_group(group: &str) -> bool {
    const BUILTIN_GROUPS: &[&str] = &[
        "",
        "apps",
        "batch",
        "autoscaling",
        "policy",
        "networking.k8s.io",
        "rbac.authorization.k8s.io",
        "storage.k8s.io",
        "admissionregistration.k8s.io",
        "apiextensions.k8s.io",
        "apiregistration.k8s.io",
        "certificates.k8s.io",
        "coordination.k8s.io",
        "discovery.k8s.io",
        "scheduling.k8s.io",
    ];
    !BUILTIN_GROUPS.contains(&group)
}

/// Order resources for creation (stable within a category)
pub fn sort_for_apply(resources: &[Resource]) -> Vec<&Resource> {
    let mut sorted: Vec<&Resource> = resources.iter().collect();
    sorted.sort_by_key(|r| ResourceCategory::of(r));
    sorted
}

/// Order resources for deletion (reverse of creation order)
pub fn sort_for_delete(resources: &[Resource]) -> Vec<&Resource> {
    let mut sorted: Vec<&Resource> = resources.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(ResourceCategory::of(r)));
    sorted
}

/// Summary of apply/delete operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSummary {
    /// Successfully processed resources
    pub succeeded: Vec<String>,
    /// Failed resources with errors
    pub failed: Vec<(String, String)>,
    /// Skipped resources with the reason
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get total count
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Turn a summary with failures into an error
    pub fn into_result(self, component: &str) -> Result<Self> {
        match self.failed.first() {
            None => Ok(self),
            Some((name, error)) => Err(KubeError::ApplyFailed {
                component: component.to_string(),
                summary: self.summary(),
                first_error: format!("{}: {}", name, error),
            }),
        }
    }
}

/// Resource manager for applying and deleting bundles
pub struct ResourceManager {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl ResourceManager {
    /// Create a new ResourceManager, running discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Refresh discovery cache (after CRD changes)
    pub async fn refresh_discovery(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    /// Resolve a resource to an API handle
    ///
    /// Unknown kinds trigger one discovery refresh, since a bundle may carry
    /// custom resources whose CRDs were applied moments earlier.
    pub async fn api_for(&self, resource: &Resource) -> Result<Api<DynamicObject>> {
        let gvk = GroupVersionKind {
            group: resource.group().to_string(),
            version: resource.version().to_string(),
            kind: resource.kind().to_string(),
        };

        let resolved = self.discovery.read().await.resolve_gvk(&gvk);
        let (api_resource, capabilities) = match resolved {
            Some(found) => found,
            None => {
                self.refresh_discovery().await?;
                self.discovery
                    .read()
                    .await
                    .resolve_gvk(&gvk)
                    .ok_or_else(|| {
                        KubeError::InvalidConfig(format!(
                            "Unknown resource type: {}/{}",
                            resource.api_version(),
                            resource.kind()
                        ))
                    })?
            }
        };

        Ok(self.api_with(resource, &api_resource, &capabilities))
    }

    fn api_with(
        &self,
        resource: &Resource,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
    ) -> Api<DynamicObject> {
        if capabilities.scope == Scope::Namespaced {
            let ns = resource.namespace().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, api_resource)
        } else {
            Api::all_with(self.client.clone(), api_resource)
        }
    }

    /// Fetch the live object for a resource, None when absent
    pub async fn get(&self, resource: &Resource) -> Result<Option<DynamicObject>> {
        let api = self.api_for(resource).await?;
        api.get_opt(resource.name()).await.map_err(KubeError::Api)
    }

    /// Apply a bundle using Server-Side Apply
    pub async fn apply_bundle(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        let mut summary = OperationSummary::default();

        for resource in sort_for_apply(bundle.resources()) {
            let name = resource.key().to_string();
            match self.apply_single(resource).await {
                Ok(()) => summary.succeeded.push(name),
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }

        Ok(summary)
    }

    async fn apply_single(&self, resource: &Resource) -> Result<()> {
        let api = self.api_for(resource).await?;

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        api.patch(resource.name(), &params, &Patch::Apply(resource.body()))
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    /// Merge labels into the live object with a JSON merge patch
    pub async fn label(
        &self,
        resource: &Resource,
        labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        let api = self.api_for(resource).await?;
        let patch = json!({"metadata": {"labels": labels}});
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match api
            .patch(resource.name(), &params, &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    /// Delete a bundle in reverse category order
    pub async fn delete_bundle(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        let mut summary = OperationSummary::default();

        for resource in sort_for_delete(bundle.resources()) {
            let name = resource.key().to_string();
            match self.delete_single(resource).await {
                Ok(true) => summary.succeeded.push(name),
                Ok(false) => summary.skipped.push((name, "not found".to_string())),
                Err(e) if e.is_not_found() => {
                    summary.skipped.push((name, "not found".to_string()))
                }
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }

        Ok(summary)
    }

    async fn delete_single(&self, resource: &Resource) -> Result<bool> {
        let api = self.api_for(resource).await?;
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(resource.name(), &params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}
