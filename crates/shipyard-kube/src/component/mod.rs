//! Installable components
//!
//! A component is one independently lifecycled sub-system. Three variants
//! implement [`Component`]:
//! - [`ChartComponent`]: a chart release managed through the package manager
//! - [`ManifestComponent`]: a manifest bundle run through the transform
//!   pipeline and applied directly
//! - [`SchemaComponent`]: the platform CRDs, versioned through the
//!   compatibility matrix
//!
//! Components are plain values rebuilt on every pass by [`components`];
//! all durable state lives in the cluster.

mod catalog;
mod chart;
mod manifest;
mod schema;

pub use catalog::{CORE_SOURCE, WORKSPACES_SOURCE, components, manifest_component};
pub use chart::ChartComponent;
pub use manifest::{ManifestComponent, PipelineInputs};
pub use schema::{SCHEMA_VERSION_ANNOTATION, SchemaComponent};

use async_trait::async_trait;
use shipyard_engine::ManifestSource;
use std::sync::Arc;

use crate::chart::ChartInstaller;
use crate::cluster::ClusterOps;
use crate::config::OperatorConfig;
use crate::error::{KubeError, Result};
use crate::installation::{ClusterInstallation, InstallPhase};
use crate::matrix::MatrixFetcher;

/// Collaborators shared by every component
#[derive(Clone)]
pub struct Context {
    pub cluster: Arc<dyn ClusterOps>,
    pub charts: Arc<dyn ChartInstaller>,
    pub manifests: Arc<dyn ManifestSource>,
    pub matrix: Arc<dyn MatrixFetcher>,
    pub config: Arc<OperatorConfig>,
}

impl Context {
    pub fn new(
        cluster: Arc<dyn ClusterOps>,
        charts: Arc<dyn ChartInstaller>,
        manifests: Arc<dyn ManifestSource>,
        matrix: Arc<dyn MatrixFetcher>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            cluster,
            charts,
            manifests,
            matrix,
            config: Arc::new(config),
        }
    }
}

/// Result of an install check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallCheck {
    /// Nothing is present
    Absent,
    /// Some but not all expected resources are present
    Partial { missing: usize, expected: usize },
    /// Present and created by this installation
    Installed,
    /// Present but created by someone else
    Foreign { target: String },
    /// Present but at another version than wanted
    Outdated { installed: String, wanted: String },
}

impl InstallCheck {
    /// Whether the component counts as present
    ///
    /// A foreign component is present; it is just not ours to touch.
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallCheck::Installed | InstallCheck::Foreign { .. })
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, InstallCheck::Foreign { .. })
    }

    /// The taxonomy error describing this check, if it carries one
    pub fn to_error(&self, component: &str) -> Option<KubeError> {
        match self {
            InstallCheck::Foreign { target } => Some(KubeError::NotInstalledByOperator {
                component: component.to_string(),
                target: target.clone(),
            }),
            InstallCheck::Partial { missing, expected } => Some(KubeError::MissingResources {
                component: component.to_string(),
                missing: *missing,
                expected: *expected,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstallCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallCheck::Absent => write!(f, "absent"),
            InstallCheck::Partial { missing, expected } => {
                write!(f, "partial ({} of {} missing)", missing, expected)
            }
            InstallCheck::Installed => write!(f, "installed"),
            InstallCheck::Foreign { target } => write!(f, "foreign ({})", target),
            InstallCheck::Outdated { installed, wanted } => {
                write!(f, "outdated ({} -> {})", installed, wanted)
            }
        }
    }
}

/// Lifecycle contract of an installable sub-system
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable component name
    fn name(&self) -> &str;

    /// Phase recorded while this component installs
    fn phase(&self) -> InstallPhase;

    /// Pure predicate over the desired state
    fn is_enabled(&self, installation: &ClusterInstallation) -> bool;

    /// Check presence, ownership first
    async fn installed(&self, ctx: &Context) -> Result<InstallCheck>;

    /// Build and apply the component, ownership labels attached
    ///
    /// Only called when the component is neither installed nor installing.
    async fn install(&self, ctx: &Context, installation: &ClusterInstallation) -> Result<()>;

    /// Installed but the readiness signal has not fired yet
    async fn installing(&self, ctx: &Context) -> Result<bool>;

    /// Installed and settled; a foreign component counts as ready
    async fn ready(&self, ctx: &Context) -> Result<bool> {
        let check = self.installed(ctx).await?;
        if check.is_foreign() {
            return Ok(true);
        }
        if !check.is_installed() {
            return Ok(false);
        }
        Ok(!self.installing(ctx).await?)
    }

    /// Remove the component; refuses with `NotInstalledByOperator` when
    /// the target is not ours
    async fn uninstall(&self, ctx: &Context, installation: &ClusterInstallation) -> Result<()>;
}
