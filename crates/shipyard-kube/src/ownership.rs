//! Ownership tracking
//!
//! Every object the operator creates carries [`OWNERSHIP_LABEL`] with the
//! owning installation's id. An object without the label, or with another
//! installation's id, is foreign and is never mutated or deleted.
//!
//! Ownership is read before a mutating call on a pre-existing object,
//! never from state observed after a mutation in the same pass.

use serde_json::json;
use shipyard_core::Resource;
use std::collections::BTreeMap;

use crate::cluster::ClusterOps;
use crate::error::Result;

/// Label identifying the owning installation
pub const OWNERSHIP_LABEL: &str = "shipyard.dev/installation";

/// Standard managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

pub const MANAGED_BY_VALUE: &str = "shipyard";

/// Who created a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Object does not exist
    Absent,
    /// Created by this installation
    Ours,
    /// Pre-existing or created by another actor
    Foreign,
}

impl Ownership {
    pub fn is_foreign(self) -> bool {
        self == Ownership::Foreign
    }
}

/// Object whose ownership decides a component's fate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Deployment { namespace: String, name: String },
    StatefulSet { namespace: String, name: String },
    Namespace { name: String },
    CustomResourceDefinition { name: String },
}

impl Target {
    pub fn deployment(namespace: &str, name: &str) -> Self {
        Target::Deployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn stateful_set(namespace: &str, name: &str) -> Self {
        Target::StatefulSet {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn namespace(name: &str) -> Self {
        Target::Namespace {
            name: name.to_string(),
        }
    }

    pub fn crd(name: &str) -> Self {
        Target::CustomResourceDefinition {
            name: name.to_string(),
        }
    }

    /// A bare document that identifies the live object
    pub fn reference(&self) -> Result<Resource> {
        let value = match self {
            Target::Deployment { namespace, name } => json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": name, "namespace": namespace},
            }),
            Target::StatefulSet { namespace, name } => json!({
                "apiVersion": "apps/v1",
                "kind": "StatefulSet",
                "metadata": {"name": name, "namespace": namespace},
            }),
            Target::Namespace { name } => json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": name},
            }),
            Target::CustomResourceDefinition { name } => json!({
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": name},
            }),
        };
        Ok(Resource::from_value(value)?)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Deployment { namespace, name } => write!(f, "Deployment {}/{}", namespace, name),
            Target::StatefulSet { namespace, name } => {
                write!(f, "StatefulSet {}/{}", namespace, name)
            }
            Target::Namespace { name } => write!(f, "Namespace {}", name),
            Target::CustomResourceDefinition { name } => {
                write!(f, "CustomResourceDefinition {}", name)
            }
        }
    }
}

/// Classify a live label set against an owner id
pub fn classify(labels: &BTreeMap<String, String>, owner: &str) -> Ownership {
    match labels.get(OWNERSHIP_LABEL) {
        Some(value) if value == owner => Ownership::Ours,
        _ => Ownership::Foreign,
    }
}

/// Fetch the target and classify it
pub async fn check(cluster: &dyn ClusterOps, target: &Target, owner: &str) -> Result<Ownership> {
    let reference = target.reference()?;
    let ownership = match cluster.metadata(&reference).await? {
        None => Ownership::Absent,
        Some(live) => classify(&live.labels, owner),
    };
    tracing::debug!(target = %target, owner, ?ownership, "checked ownership");
    Ok(ownership)
}

/// Labels attached to everything the operator creates
pub fn ownership_labels(owner: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(OWNERSHIP_LABEL.to_string(), owner.to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;

    fn deployment(labels: serde_json::Value) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "cert-manager", "namespace": "cert-manager", "labels": labels},
        }))
        .unwrap()
    }

    #[test]
    fn test_classify() {
        let ours = ownership_labels("shipyard-system.main");
        assert_eq!(classify(&ours, "shipyard-system.main"), Ownership::Ours);
        assert_eq!(classify(&ours, "other.main"), Ownership::Foreign);
        assert_eq!(classify(&BTreeMap::new(), "shipyard-system.main"), Ownership::Foreign);
    }

    #[test]
    fn test_target_reference_identity() {
        let target = Target::stateful_set("platform", "redis-master");
        let reference = target.reference().unwrap();
        assert_eq!(reference.kind(), "StatefulSet");
        assert_eq!(reference.namespace(), Some("platform"));
        assert_eq!(reference.name(), "redis-master");

        let crd = Target::crd("certificates.cert-manager.io").reference().unwrap();
        assert!(crd.is_cluster_scoped());
    }

    #[tokio::test]
    async fn test_check_against_cluster() {
        let cluster = MockCluster::new();
        let target = Target::deployment("cert-manager", "cert-manager");
        let owner = "shipyard-system.main";

        assert_eq!(check(&cluster, &target, owner).await.unwrap(), Ownership::Absent);

        cluster.insert(deployment(json!({"app": "cert-manager"})));
        assert_eq!(check(&cluster, &target, owner).await.unwrap(), Ownership::Foreign);

        cluster.insert(deployment(json!({OWNERSHIP_LABEL: owner})));
        assert_eq!(check(&cluster, &target, owner).await.unwrap(), Ownership::Ours);
    }
}
