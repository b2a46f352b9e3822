//! In-memory cluster for testing
//!
//! Objects are kept as full resource documents keyed by identity. Apply
//! overwrites, delete removes, and pods are plain (namespace, name, phase)
//! records the test controls.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;
use shipyard_core::{ManifestBundle, Resource, ResourceKey};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ClusterOps, LiveMetadata};
use crate::error::{KubeError, Result};
use crate::resources::{OperationSummary, sort_for_apply, sort_for_delete};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKey, Resource>,
    pods: Vec<MockPod>,
    pending_crds: BTreeSet<String>,
    hold_crds: bool,
    apply_error: Option<String>,
    unavailable: bool,
}

#[derive(Debug, Clone)]
struct MockPod {
    namespace: String,
    name: String,
    phase: String,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClusterOperationCounts {
    pub gets: usize,
    /// Resources applied, not apply calls
    pub applied: usize,
    /// Resources deleted
    pub deleted: usize,
    pub namespaces_created: usize,
    pub namespaces_deleted: usize,
    /// Objects relabelled in place
    pub labelled: usize,
    /// Pod readiness queries, failed ones included
    pub pod_checks: usize,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<State>>,
    operations: Arc<RwLock<ClusterOperationCounts>>,
}

impl MockCluster {
    /// Create a new empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut ClusterOperationCounts)) {
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut ops);
    }

    fn check_available(&self) -> Result<()> {
        if self.read().unavailable {
            return Err(KubeError::Timeout("mock API server unavailable".to_string()));
        }
        Ok(())
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> ClusterOperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store an object as if another actor created it
    pub fn insert(&self, resource: Resource) {
        self.write().objects.insert(resource.key(), resource);
    }

    /// Remove an object behind the operator's back
    pub fn remove(&self, key: &ResourceKey) -> Option<Resource> {
        self.write().objects.remove(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Resource> {
        self.read().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.read().objects.contains_key(key)
    }

    /// All stored objects in key order
    pub fn objects(&self) -> Vec<Resource> {
        self.read().objects.values().cloned().collect()
    }

    /// Number of objects in a namespace
    pub fn count_in(&self, namespace: &str) -> usize {
        self.read()
            .objects
            .keys()
            .filter(|key| key.namespace.as_deref() == Some(namespace))
            .count()
    }

    /// Add or update a pod
    pub fn set_pod(&self, namespace: &str, name: &str, phase: &str) {
        let mut state = self.write();
        match state
            .pods
            .iter_mut()
            .find(|p| p.namespace == namespace && p.name == name)
        {
            Some(pod) => pod.phase = phase.to_string(),
            None => state.pods.push(MockPod {
                namespace: namespace.to_string(),
                name: name.to_string(),
                phase: phase.to_string(),
            }),
        }
    }

    /// Keep newly applied CRDs from becoming Established
    pub fn hold_crds(&self, hold: bool) {
        let mut state = self.write();
        state.hold_crds = hold;
        if !hold {
            state.pending_crds.clear();
        }
    }

    /// Fail every resource of subsequent applies with this message
    pub fn fail_applies(&self, message: Option<&str>) {
        self.write().apply_error = message.map(str::to_string);
    }

    /// Make every call fail as if the API server were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Store an Opaque secret with plain values
    pub fn insert_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let encoded: serde_json::Map<String, serde_json::Value> = data
            .iter()
            .map(|(k, v)| {
                let value = base64::engine::general_purpose::STANDARD.encode(v.as_bytes());
                (k.to_string(), json!(value))
            })
            .collect();
        let secret = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": name, "namespace": namespace},
            "type": "Opaque",
            "data": encoded,
        });
        if let Ok(resource) = Resource::from_value(secret) {
            self.insert(resource);
        }
    }
}

fn namespace_key(name: &str) -> ResourceKey {
    ResourceKey {
        kind: "Namespace".to_string(),
        namespace: None,
        name: name.to_string(),
    }
}

fn crd_key(name: &str) -> ResourceKey {
    ResourceKey {
        kind: "CustomResourceDefinition".to_string(),
        namespace: None,
        name: name.to_string(),
    }
}

#[async_trait]
impl ClusterOps for MockCluster {
    async fn metadata(&self, resource: &Resource) -> Result<Option<LiveMetadata>> {
        self.check_available()?;
        self.count(|ops| ops.gets += 1);

        Ok(self.read().objects.get(&resource.key()).map(|live| LiveMetadata {
            labels: live.labels(),
            annotations: live.annotations(),
        }))
    }

    async fn apply(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        self.check_available()?;
        let mut summary = OperationSummary::default();
        let mut state = self.write();

        for resource in sort_for_apply(bundle.resources()) {
            let key = resource.key();
            if let Some(message) = &state.apply_error {
                summary.failed.push((key.to_string(), message.clone()));
                continue;
            }
            if resource.kind() == "CustomResourceDefinition" && state.hold_crds {
                state.pending_crds.insert(resource.name().to_string());
            }
            state.objects.insert(key.clone(), resource.clone());
            summary.succeeded.push(key.to_string());
        }
        drop(state);

        let applied = summary.succeeded.len();
        self.count(|ops| ops.applied += applied);
        Ok(summary)
    }

    async fn delete(&self, bundle: &ManifestBundle) -> Result<OperationSummary> {
        self.check_available()?;
        let mut summary = OperationSummary::default();
        let mut state = self.write();

        for resource in sort_for_delete(bundle.resources()) {
            let key = resource.key();
            match state.objects.remove(&key) {
                Some(_) => summary.succeeded.push(key.to_string()),
                None => summary
                    .skipped
                    .push((key.to_string(), "not found".to_string())),
            }
        }
        drop(state);

        let deleted = summary.succeeded.len();
        self.count(|ops| ops.deleted += deleted);
        Ok(summary)
    }

    async fn label(
        &self,
        resource: &Resource,
        labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        self.check_available()?;
        let mut state = self.write();
        let Some(live) = state.objects.get_mut(&resource.key()) else {
            return Ok(false);
        };
        for (key, value) in labels {
            live.set_label(key, value);
        }
        drop(state);

        self.count(|ops| ops.labelled += 1);
        Ok(true)
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        self.check_available()?;
        let key = namespace_key(name);
        let mut state = self.write();
        if state.objects.contains_key(&key) {
            return Ok(false);
        }

        let namespace = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name, "labels": labels},
        }))?;
        state.objects.insert(key, namespace);
        drop(state);

        self.count(|ops| ops.namespaces_created += 1);
        Ok(true)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.write();
        if state.objects.remove(&namespace_key(name)).is_none() {
            return Ok(());
        }
        state
            .objects
            .retain(|key, _| key.namespace.as_deref() != Some(name));
        state.pods.retain(|pod| pod.namespace != name);
        drop(state);

        self.count(|ops| ops.namespaces_deleted += 1);
        Ok(())
    }

    async fn pod_running(&self, namespace: &str, prefix: &str) -> Result<bool> {
        self.count(|ops| ops.pod_checks += 1);
        self.check_available()?;
        Ok(self.read().pods.iter().any(|pod| {
            pod.namespace == namespace && pod.name.starts_with(prefix) && pod.phase == "Running"
        }))
    }

    async fn crd_exists(&self, name: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.read().objects.contains_key(&crd_key(name)))
    }

    async fn crd_established(&self, name: &str) -> Result<bool> {
        self.check_available()?;
        let state = self.read();
        Ok(state.objects.contains_key(&crd_key(name)) && !state.pending_crds.contains(name))
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>> {
        self.check_available()?;
        let secret_key = ResourceKey {
            kind: "Secret".to_string(),
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        };
        let state = self.read();
        let Some(secret) = state.objects.get(&secret_key) else {
            return Ok(None);
        };

        let body = secret.body();
        if let Some(encoded) = body.pointer(&format!("/data/{}", key)).and_then(|v| v.as_str()) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| KubeError::Serialization(e.to_string()))?;
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(body
            .pointer(&format!("/stringData/{}", key))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}
