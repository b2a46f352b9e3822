//! Package manager collaborator
//!
//! Chart-backed components install through [`ChartInstaller`]:
//! - **HelmCli**: shells out to the `helm` binary
//! - **MockChartInstaller**: in-memory releases for tests
//!
//! Settings travel with every call as a [`HelmSettings`] value.

mod helm;
mod mock;

pub use helm::HelmCli;
pub use mock::{ChartOperationCounts, MockChartInstaller, MockRelease, MockWorkload};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipyard_core::Values;

use crate::config::HelmSettings;
use crate::error::Result;

/// A chart in a named repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Repository name, resolved through [`HelmSettings::repositories`]
    pub repository: String,
    pub name: String,
    /// Chart version, latest when unset
    pub version: Option<String>,
}

impl ChartRef {
    pub fn new(repository: &str, name: &str, version: Option<&str>) -> Self {
        Self {
            repository: repository.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }
}

impl std::fmt::Display for ChartRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}@{}", self.repository, self.name, v),
            None => write!(f, "{}/{}", self.repository, self.name),
        }
    }
}

/// Chart type from Chart.yaml
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Application,
    Library,
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::Library => write!(f, "library"),
        }
    }
}

/// Chart metadata returned by a load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "type")]
    pub chart_type: ChartType,
}

/// Release status as reported by the package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseStatus {
    Deployed,
    PendingInstall,
    PendingUpgrade,
    Failed,
    Uninstalling,
    Other(String),
}

impl ReleaseStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "deployed" => Self::Deployed,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "failed" => Self::Failed,
            "uninstalling" => Self::Uninstalling,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed)
    }
}

/// Install, upgrade and remove chart releases
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Status of a release, None when it does not exist
    async fn release_status(
        &self,
        release: &str,
        namespace: &str,
        settings: &HelmSettings,
    ) -> Result<Option<ReleaseStatus>>;

    /// Resolve a chart and read its metadata
    async fn load_chart(&self, chart: &ChartRef, settings: &HelmSettings)
    -> Result<ChartMetadata>;

    /// Install the release, or upgrade it in place when it exists
    async fn install_or_upgrade(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Values,
        settings: &HelmSettings,
    ) -> Result<()>;

    /// Remove a release; a missing release is not an error
    async fn uninstall(&self, release: &str, namespace: &str, settings: &HelmSettings)
    -> Result<()>;
}
