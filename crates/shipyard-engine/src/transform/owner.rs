use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shipyard_core::Resource;

use super::{Filter, FilterStage};

/// Owner reference pointing at the installation object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Attaches the owner reference to resources in the owner's namespace
///
/// Owner references cannot cross namespaces, so cluster-scoped resources
/// and resources elsewhere are left alone. A reference with the same uid
/// is never added twice.
#[derive(Debug, Clone)]
pub struct OwnerReferenceFilter {
    namespace: String,
    owner: OwnerReference,
}

impl OwnerReferenceFilter {
    pub fn new(namespace: impl Into<String>, owner: OwnerReference) -> Self {
        Self {
            namespace: namespace.into(),
            owner,
        }
    }

    fn already_owned(&self, references: &[JsonValue]) -> bool {
        references
            .iter()
            .any(|r| r.get("uid").and_then(JsonValue::as_str) == Some(self.owner.uid.as_str()))
    }
}

impl Filter for OwnerReferenceFilter {
    fn name(&self) -> &'static str {
        "owner-reference"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::OwnerReference
    }

    fn apply(&self, mut resources: Vec<Resource>) -> Vec<Resource> {
        let Ok(reference) = serde_json::to_value(&self.owner) else {
            return resources;
        };

        for resource in &mut resources {
            if resource.namespace() != Some(self.namespace.as_str()) {
                continue;
            }
            let metadata = resource.metadata_mut();
            let entry = metadata
                .entry("ownerReferences")
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            if !entry.is_array() {
                *entry = JsonValue::Array(Vec::new());
            }
            if let Some(references) = entry.as_array_mut() {
                if !self.already_owned(references) {
                    references.push(reference.clone());
                }
            }
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "shipyard.dev/v1alpha1".to_string(),
            kind: "ClusterInstallation".to_string(),
            name: "main".to_string(),
            uid: "8b9c".to_string(),
            controller: true,
            block_owner_deletion: true,
        }
    }

    fn resource(namespace: Option<&str>) -> Resource {
        let mut value = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        });
        if let Some(ns) = namespace {
            value["metadata"]["namespace"] = json!(ns);
        }
        Resource::from_value(value).unwrap()
    }

    #[test]
    fn test_adds_reference_in_namespace() {
        let out = OwnerReferenceFilter::new("platform", owner()).apply(vec![resource(Some("platform"))]);
        let refs = &out[0].body()["metadata"]["ownerReferences"];
        assert_eq!(refs[0]["uid"], json!("8b9c"));
        assert_eq!(refs[0]["apiVersion"], json!("shipyard.dev/v1alpha1"));
        assert_eq!(refs[0]["blockOwnerDeletion"], json!(true));
    }

    #[test]
    fn test_skips_other_namespaces_and_cluster_scope() {
        let filter = OwnerReferenceFilter::new("platform", owner());
        let out = filter.apply(vec![resource(Some("cert-manager")), resource(None)]);
        for r in out {
            assert!(r.body()["metadata"].get("ownerReferences").is_none());
        }
    }

    #[test]
    fn test_does_not_duplicate() {
        let filter = OwnerReferenceFilter::new("platform", owner());
        let once = filter.apply(vec![resource(Some("platform"))]);
        let twice = filter.apply(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            twice[0].body()["metadata"]["ownerReferences"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }
}
