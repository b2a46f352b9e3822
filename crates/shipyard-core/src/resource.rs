//! Structured resource documents and ordered manifest bundles
//!
//! A [`Resource`] is one Kubernetes object kept as a JSON tree so that
//! transforms can touch any field without compile-time type knowledge.
//! A [`ManifestBundle`] is the ordered sequence of resources rendered from
//! a manifest source or chart.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};

/// Kinds that are never namespaced
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "ClusterIssuer",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
    "IngressClass",
    "APIService",
    "ValidatingWebhookConfiguration",
    "MutatingWebhookConfiguration",
];

/// Identity of a resource for ownership and drift purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A single structured resource document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Resource(JsonValue);

impl Resource {
    /// Build a resource from a parsed document
    ///
    /// The document must be an object carrying `apiVersion`, `kind` and
    /// `metadata.name`.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        Self::validate(&value, 0)?;
        Ok(Self(value))
    }

    fn validate(value: &JsonValue, index: usize) -> Result<()> {
        let invalid = |message: &str| CoreError::InvalidResource {
            index,
            message: message.to_string(),
        };

        if !value.is_object() {
            return Err(invalid("document is not a mapping"));
        }
        if value.get("apiVersion").and_then(JsonValue::as_str).is_none() {
            return Err(invalid("missing apiVersion"));
        }
        if value.get("kind").and_then(JsonValue::as_str).is_none() {
            return Err(invalid("missing kind"));
        }
        if value
            .pointer("/metadata/name")
            .and_then(JsonValue::as_str)
            .is_none()
        {
            return Err(invalid("missing metadata.name"));
        }
        Ok(())
    }

    pub fn api_version(&self) -> &str {
        self.0
            .get("apiVersion")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0
            .get("kind")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    /// API group ("" for the core group)
    pub fn group(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// API version without the group
    pub fn version(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn name(&self) -> &str {
        self.0
            .pointer("/metadata/name")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0
            .pointer("/metadata/namespace")
            .and_then(JsonValue::as_str)
    }

    /// Whether the kind is known to be cluster-scoped
    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&self.kind())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), JsonValue::String(namespace.to_string()));
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind().to_string(),
            namespace: self.namespace().map(str::to_string),
            name: self.name().to_string(),
        }
    }

    /// Labels as an owned, sorted map
    pub fn labels(&self) -> BTreeMap<String, String> {
        string_map(self.0.pointer("/metadata/labels"))
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(JsonValue::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        object_entry(self.metadata_mut(), "labels")
            .insert(key.to_string(), JsonValue::String(value.to_string()));
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        string_map(self.0.pointer("/metadata/annotations"))
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(JsonValue::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        object_entry(self.metadata_mut(), "annotations")
            .insert(key.to_string(), JsonValue::String(value.to_string()));
    }

    /// The full document
    pub fn body(&self) -> &JsonValue {
        &self.0
    }

    /// Mutable access to the full document
    ///
    /// Callers must keep `apiVersion`, `kind` and `metadata.name` intact.
    pub fn body_mut(&mut self) -> &mut JsonValue {
        &mut self.0
    }

    /// The `metadata` object, created if missing
    ///
    /// A document that is no longer an object is reset to an empty one.
    pub fn metadata_mut(&mut self) -> &mut Map<String, JsonValue> {
        object_entry(ensure_object(&mut self.0), "metadata")
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Ordered sequence of resources awaiting transformation and apply
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ManifestBundle {
    resources: Vec<Resource>,
}

impl ManifestBundle {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Parse a multi-document YAML stream
    ///
    /// Empty documents are skipped and `kind: List` documents are flattened
    /// into their items.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut resources = Vec::new();

        for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
            let value = JsonValue::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            if value.get("kind").and_then(JsonValue::as_str) == Some("List") {
                let items = value
                    .get("items")
                    .and_then(JsonValue::as_array)
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    Resource::validate(&item, index)?;
                    resources.push(Resource(item));
                }
                continue;
            }

            Resource::validate(&value, index)?;
            resources.push(Resource(value));
        }

        Ok(Self { resources })
    }

    /// Render back to a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for resource in &self.resources {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(resource.body())?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Append all resources of another bundle
    pub fn extend(&mut self, other: ManifestBundle) {
        self.resources.extend(other.resources);
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.resources
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.iter().map(Resource::key).collect()
    }

    /// Find a resource by kind and name
    pub fn find(&self, kind: &str, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.kind() == kind && r.name() == name)
    }
}

impl IntoIterator for ManifestBundle {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a ManifestBundle {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

impl FromIterator<Resource> for ManifestBundle {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

fn object_entry<'a>(map: &'a mut Map<String, JsonValue>, key: &str) -> &'a mut Map<String, JsonValue> {
    ensure_object(
        map.entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new())),
    )
}

/// Replace a non-object value with an empty object and borrow the map
fn ensure_object(value: &mut JsonValue) -> &mut Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => {
            *other = JsonValue::Object(Map::new());
            ensure_object(other)
        }
    }
}

fn string_map(value: Option<&JsonValue>) -> BTreeMap<String, String> {
    value
        .and_then(JsonValue::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: platform
---
# comment-only documents are fine
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: shipyard-api
  namespace: platform
  labels:
    app: shipyard-api
spec:
  replicas: 1
"#;

    #[test]
    fn test_parse_multi_document() {
        let bundle = ManifestBundle::from_yaml(MANIFEST).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.resources()[0].kind(), "Namespace");
        assert_eq!(bundle.resources()[1].name(), "shipyard-api");
    }

    #[test]
    fn test_parse_list_is_flattened() {
        let yaml = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: a
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: b
"#;
        let bundle = ManifestBundle::from_yaml(yaml).unwrap();
        assert_eq!(bundle.len(), 2);
        assert!(bundle.find("ConfigMap", "b").is_some());
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n";
        let err = ManifestBundle::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_metadata_mut_recovers_replaced_body() {
        let mut resource = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "labels": "not-a-map"},
        }))
        .unwrap();

        resource.set_label("tier", "api");
        assert_eq!(resource.label("tier"), Some("api"));

        *resource.body_mut() = json!(["not", "an", "object"]);
        resource
            .metadata_mut()
            .insert("name".to_string(), json!("settings"));
        resource.set_annotation("note", "rebuilt");

        assert_eq!(resource.name(), "settings");
        assert_eq!(resource.annotation("note"), Some("rebuilt"));
        assert_eq!(resource.kind(), "");
    }

    #[test]
    fn test_group_and_version() {
        let deployment = Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "x"}
        }))
        .unwrap();
        assert_eq!(deployment.group(), "apps");
        assert_eq!(deployment.version(), "v1");

        let cm = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "x"}
        }))
        .unwrap();
        assert_eq!(cm.group(), "");
        assert_eq!(cm.version(), "v1");
    }

    #[test]
    fn test_labels_and_annotations() {
        let mut resource = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        }))
        .unwrap();

        assert!(resource.labels().is_empty());
        resource.set_label("app", "shipyard");
        resource.set_annotation("note", "hello");

        assert_eq!(resource.label("app"), Some("shipyard"));
        assert_eq!(resource.annotation("note"), Some("hello"));
        assert_eq!(resource.labels().len(), 1);
        assert_eq!(resource.annotations().len(), 1);
    }

    #[test]
    fn test_set_namespace_and_key() {
        let mut resource = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "api"}
        }))
        .unwrap();
        assert_eq!(resource.namespace(), None);

        resource.set_namespace("tenant-a");
        let key = resource.key();
        assert_eq!(key.namespace.as_deref(), Some("tenant-a"));
        assert_eq!(key.to_string(), "tenant-a/Service/api");
    }

    #[test]
    fn test_cluster_scoped() {
        let ns = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "platform"}
        }))
        .unwrap();
        assert!(ns.is_cluster_scoped());
        assert_eq!(ns.key().to_string(), "Namespace/platform");
    }

    #[test]
    fn test_to_yaml_reparses() {
        let bundle = ManifestBundle::from_yaml(MANIFEST).unwrap();
        let yaml = bundle.to_yaml().unwrap();
        let reparsed = ManifestBundle::from_yaml(&yaml).unwrap();
        assert_eq!(bundle, reparsed);
    }
}
