//! Operator configuration
//!
//! Loaded once at startup from an optional YAML file and passed by value
//! into every collaborator that needs it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Top-level operator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Root directory of manifest sources (`core/`, `workspaces/`, `crds/<version>/`)
    pub manifests_dir: PathBuf,

    /// URL of the platform version to schema version matrix
    pub matrix_url: String,

    /// Delay before re-running a pass that is still converging
    #[serde(with = "humantime_serde")]
    pub requeue_interval: Duration,

    /// Delay before retrying after a transient error
    #[serde(with = "humantime_serde")]
    pub error_requeue_interval: Duration,

    /// Package manager settings
    pub helm: HelmSettings,

    /// Bounded wait for workloads to come up
    pub pod_wait: PodWaitConfig,

    /// Vault auto-unseal side task
    pub unseal: UnsealConfig,

    /// Images never rewritten to the platform version
    pub deprecated_images: Vec<String>,

    /// Only images under this prefix are pinned to the platform version
    pub image_repository_prefix: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            manifests_dir: PathBuf::from("/etc/shipyard/manifests"),
            matrix_url: "https://releases.shipyard.dev/matrix.json".to_string(),
            requeue_interval: Duration::from_secs(10),
            error_requeue_interval: Duration::from_secs(30),
            helm: HelmSettings::default(),
            pod_wait: PodWaitConfig::default(),
            unseal: UnsealConfig::default(),
            deprecated_images: vec!["ghcr.io/shipyard/legacy-dashboard".to_string()],
            image_repository_prefix: "ghcr.io/shipyard/".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` when given and present, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load_from(path),
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}

/// Settings handed to the chart installer on every call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmSettings {
    /// Path or name of the helm binary
    pub binary: PathBuf,

    /// Repository name to URL
    pub repositories: BTreeMap<String, String>,

    /// kubeconfig context, current context when unset
    pub kube_context: Option<String>,

    /// Per-operation timeout passed to helm
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra arguments appended to install/upgrade
    pub extra_args: Vec<String>,
}

impl Default for HelmSettings {
    fn default() -> Self {
        let repositories = [
            ("jetstack", "https://charts.jetstack.io"),
            ("bitnami", "https://charts.bitnami.com/bitnami"),
            ("hashicorp", "https://helm.releases.hashicorp.com"),
        ]
        .into_iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect();

        Self {
            binary: PathBuf::from("helm"),
            repositories,
            kube_context: None,
            timeout: Duration::from_secs(300),
            extra_args: Vec::new(),
        }
    }
}

impl HelmSettings {
    /// URL of a configured repository
    pub fn repository_url(&self, name: &str) -> Option<&str> {
        self.repositories.get(name).map(String::as_str)
    }
}

/// Polling bound for workload readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodWaitConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PodWaitConfig {
    fn default() -> Self {
        // 20 polls, 10 seconds apart
        Self {
            timeout: Duration::from_secs(200),
            interval: Duration::from_secs(10),
        }
    }
}

/// Vault auto-unseal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnsealConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Vault API base URL
    pub address: String,

    /// Secret holding newline-separated unseal keys under `keys`
    pub keys_secret: String,

    pub keys_namespace: String,

    /// Namespace of the vault pods
    pub pod_namespace: String,

    /// Name prefix of the vault pods
    pub pod_prefix: String,
}

impl Default for UnsealConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(30),
            address: "http://vault.shipyard-system.svc:8200".to_string(),
            keys_secret: "vault-unseal-keys".to_string(),
            keys_namespace: "shipyard-system".to_string(),
            pod_namespace: "shipyard-system".to_string(),
            pod_prefix: "vault-".to_string(),
        }
    }
}
