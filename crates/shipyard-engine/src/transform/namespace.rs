use serde_json::Value as JsonValue;
use shipyard_core::Resource;

use super::{Filter, FilterStage};

/// Annotation cert-manager's CA injector reads (`<namespace>/<certificate>`)
const INJECT_CA_FROM: &str = "cert-manager.io/inject-ca-from";

/// Spec fields that reference an object in the installation namespace
const NAMESPACED_REFS: &[&str] = &["/spec/tenantRef", "/spec/secretRef"];

/// Moves every namespaced resource into the target namespace
///
/// Besides `metadata.namespace`, references that embed a namespace are
/// rewritten too: service account subjects of role bindings, webhook and
/// API service backends, CRD conversion webhooks, the CA injection
/// annotation and tenant/secret references. `Namespace` objects are
/// renamed to the target.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    namespace: String,
}

impl NamespaceFilter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn rewrite(&self, resource: &mut Resource) {
        let kind = resource.kind().to_string();
        match kind.as_str() {
            "Namespace" => {
                resource
                    .metadata_mut()
                    .insert("name".to_string(), JsonValue::String(self.namespace.clone()));
            }
            "RoleBinding" | "ClusterRoleBinding" => {
                if let Some(subjects) = resource
                    .body_mut()
                    .get_mut("subjects")
                    .and_then(JsonValue::as_array_mut)
                {
                    for subject in subjects {
                        if subject.get("kind").and_then(JsonValue::as_str) == Some("ServiceAccount")
                        {
                            self.set_namespace_field(subject);
                        }
                    }
                }
            }
            "ValidatingWebhookConfiguration" | "MutatingWebhookConfiguration" => {
                if let Some(webhooks) = resource
                    .body_mut()
                    .get_mut("webhooks")
                    .and_then(JsonValue::as_array_mut)
                {
                    for webhook in webhooks {
                        if let Some(service) = webhook.pointer_mut("/clientConfig/service") {
                            self.set_namespace_field(service);
                        }
                    }
                }
            }
            "CustomResourceDefinition" => {
                if let Some(service) = resource
                    .body_mut()
                    .pointer_mut("/spec/conversion/webhook/clientConfig/service")
                {
                    self.set_namespace_field(service);
                }
            }
            "APIService" => {
                if let Some(service) = resource.body_mut().pointer_mut("/spec/service") {
                    self.set_namespace_field(service);
                }
            }
            _ => {}
        }

        for pointer in NAMESPACED_REFS {
            if let Some(reference) = resource.body_mut().pointer_mut(pointer) {
                if reference.get("namespace").is_some() {
                    self.set_namespace_field(reference);
                }
            }
        }

        let inject_from = resource
            .annotation(INJECT_CA_FROM)
            .and_then(|value| value.split_once('/'))
            .map(|(_, certificate)| format!("{}/{}", self.namespace, certificate));
        if let Some(rewritten) = inject_from {
            resource.set_annotation(INJECT_CA_FROM, &rewritten);
        }

        if !resource.is_cluster_scoped() {
            resource.set_namespace(&self.namespace);
        }
    }

    fn set_namespace_field(&self, value: &mut JsonValue) {
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "namespace".to_string(),
                JsonValue::String(self.namespace.clone()),
            );
        }
    }
}

impl Filter for NamespaceFilter {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::Namespace
    }

    fn apply(&self, mut resources: Vec<Resource>) -> Vec<Resource> {
        for resource in &mut resources {
            self.rewrite(resource);
        }
        resources
    }
}
