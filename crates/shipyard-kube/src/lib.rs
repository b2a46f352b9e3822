//! Shipyard Kube - cluster side of the Shipyard operator
//!
//! This crate provides:
//! - **ClusterInstallation**: the custom resource describing one platform installation
//! - **Components**: chart, raw-manifest and schema sub-systems with a common lifecycle
//! - **Orchestrator**: dependency-ordered, resumable reconciliation
//! - **Controller**: kube-runtime wiring with a cleanup finalizer
//! - **Ownership**: label-based tracking of what this operator created
//! - **Collaborators**: cluster and chart traits with real and in-memory implementations
//! - **Side tasks**: bounded pod wait and vault auto-unseal

pub mod chart;
pub mod cluster;
pub mod component;
pub mod config;
pub mod controller;
pub mod error;
pub mod installation;
pub mod matrix;
pub mod orchestrator;
pub mod ownership;
pub mod resources;
pub mod status;
pub mod unseal;
pub mod wait;

pub use chart::{
    ChartInstaller, ChartMetadata, ChartRef, ChartType, HelmCli, MockChartInstaller,
    ReleaseStatus,
};
pub use cluster::{ClusterOps, KubeCluster, LiveMetadata, MockCluster};
pub use component::{
    ChartComponent, Component, Context, InstallCheck, ManifestComponent, PipelineInputs,
    SchemaComponent, components, manifest_component,
};
pub use config::{HelmSettings, OperatorConfig, PodWaitConfig, UnsealConfig};
pub use controller::{ControllerContext, FINALIZER};
pub use error::{ErrorKind, KubeError, Result};
pub use installation::{
    ClusterInstallation, ClusterInstallationSpec, ClusterInstallationStatus, ComponentSpec,
    ComponentStatus, CoreSpec, InstallPhase,
};
pub use matrix::{HttpMatrixFetcher, MatrixFetcher, StaticMatrix, resolve_schema_version};
pub use orchestrator::Orchestrator;
pub use ownership::{OWNERSHIP_LABEL, Ownership, Target};
pub use resources::{OperationSummary, ResourceManager};
pub use status::{KubeStatusStore, MemoryStatusStore, StatusStore};
pub use unseal::{SealStatus, UnsealOutcome, Unsealer};
pub use wait::wait_for_pod_running;
