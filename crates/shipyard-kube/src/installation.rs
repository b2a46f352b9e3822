//! ClusterInstallation Custom Resource Definition
//!
//! The desired state of one platform installation: which sub-systems are
//! enabled, their value overrides, and the target platform version. The
//! status is written only by the orchestrator.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use shipyard_core::Values;

/// Namespace used when neither the spec nor the object names one
pub const DEFAULT_NAMESPACE: &str = "shipyard-system";

/// Specification for a ClusterInstallation
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "shipyard.dev",
    version = "v1alpha1",
    kind = "ClusterInstallation",
    plural = "clusterinstallations",
    shortname = "ci",
    status = "ClusterInstallationStatus",
    namespaced,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstallationSpec {
    /// Target platform version, or `develop`
    pub version: String,

    /// Namespace platform components are installed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub cert_manager: ComponentSpec,

    #[serde(default)]
    pub database: ComponentSpec,

    #[serde(default)]
    pub object_store: ComponentSpec,

    #[serde(default)]
    pub cache: ComponentSpec,

    #[serde(default)]
    pub vault: ComponentSpec,

    #[serde(default)]
    pub core: CoreSpec,

    #[serde(default)]
    pub workspaces: ComponentSpec,
}

/// Per sub-system switch and value overrides
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// Free-form overrides merged over the component defaults
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    #[schemars(schema_with = "free_form")]
    pub values: JsonValue,
}

impl Default for ComponentSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            values: JsonValue::Null,
        }
    }
}

impl ComponentSpec {
    /// Overrides as a values tree
    pub fn values(&self) -> Values {
        match &self.values {
            JsonValue::Null => Values::new(),
            other => Values(other.clone()),
        }
    }
}

/// Core application system
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Token signing key; generated once and kept when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

fn free_form(_: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        JsonValue::Bool(true),
    );
    schema.into()
}

/// Installation progress
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum InstallPhase {
    #[default]
    Pending,
    InstallingCertManager,
    InstallingDatabase,
    InstallingObjectStore,
    InstallingCache,
    InstallingVault,
    InstallingCrds,
    InstallingCore,
    InstallingWorkspaces,
    Running,
    Failed,
    Uninstalling,
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InstallingCertManager => "InstallingCertManager",
            Self::InstallingDatabase => "InstallingDatabase",
            Self::InstallingObjectStore => "InstallingObjectStore",
            Self::InstallingCache => "InstallingCache",
            Self::InstallingVault => "InstallingVault",
            Self::InstallingCrds => "InstallingCrds",
            Self::InstallingCore => "InstallingCore",
            Self::InstallingWorkspaces => "InstallingWorkspaces",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Uninstalling => "Uninstalling",
        };
        write!(f, "{}", s)
    }
}

/// Observed state of one sub-system
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Workload state (Installing, Ready, Unmanaged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// Service state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl ComponentStatus {
    pub fn new(state: &str) -> Self {
        Self {
            deployment: Some(state.to_string()),
            service: Some(state.to_string()),
        }
    }
}

/// Status for a ClusterInstallation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstallationStatus {
    #[serde(default)]
    pub phase: InstallPhase,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, ComponentStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_upgraded: Option<DateTime<Utc>>,

    /// Failure or progress message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last platform version that reached Running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ClusterInstallation {
    /// Namespace platform components live in
    pub fn target_namespace(&self) -> String {
        self.spec
            .namespace
            .clone()
            .or_else(|| self.namespace())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Value of the ownership label for resources this installation creates
    pub fn owner_id(&self) -> String {
        let namespace = self
            .namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        format!("{}.{}", namespace, self.name_any())
    }

    pub fn phase(&self) -> InstallPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Parse a manifest (used by the CLI and tests)
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
