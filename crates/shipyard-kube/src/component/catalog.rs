//! The platform's components in dependency order

use serde_json::json;
use shipyard_core::Values;

use super::{ChartComponent, Component, ManifestComponent, SchemaComponent};
use crate::chart::ChartRef;
use crate::installation::{ClusterInstallation, InstallPhase};
use crate::ownership::Target;

/// Manifest source of the core application
pub const CORE_SOURCE: &str = "core";

/// Manifest source of tenant workspaces
pub const WORKSPACES_SOURCE: &str = "workspaces";

/// Namespace cert-manager is installed into
const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

/// Build every component for one reconciliation pass
///
/// Order is dependency order: nothing is installed before everything
/// ahead of it is installed or installing.
pub fn components(installation: &ClusterInstallation) -> Vec<Box<dyn Component>> {
    let namespace = installation.target_namespace();
    let owner = installation.owner_id();

    let charts = vec![
        ChartComponent::new(
            "cert-manager",
            InstallPhase::InstallingCertManager,
            ChartRef::new("jetstack", "cert-manager", None),
            CERT_MANAGER_NAMESPACE,
            &owner,
            |spec| &spec.cert_manager,
        )
        .with_label_path("global.commonLabels")
        .with_defaults(Values(json!({"crds": {"enabled": true}})))
        .dedicated_namespace(),
        ChartComponent::new(
            "database",
            InstallPhase::InstallingDatabase,
            ChartRef::new("bitnami", "postgresql", None),
            &namespace,
            &owner,
            |spec| &spec.database,
        )
        .with_target(Target::stateful_set(&namespace, "postgresql"))
        .with_defaults(Values(json!({
            "auth": {"database": "shipyard", "username": "shipyard"}
        }))),
        ChartComponent::new(
            "object-store",
            InstallPhase::InstallingObjectStore,
            ChartRef::new("bitnami", "minio", None),
            &namespace,
            &owner,
            |spec| &spec.object_store,
        )
        .with_defaults(Values(json!({"mode": "standalone"}))),
        ChartComponent::new(
            "cache",
            InstallPhase::InstallingCache,
            ChartRef::new("bitnami", "redis", None),
            &namespace,
            &owner,
            |spec| &spec.cache,
        )
        .with_target(Target::stateful_set(&namespace, "redis-master"))
        .with_ready_prefix("redis-master")
        .with_defaults(Values(json!({"architecture": "standalone"}))),
        ChartComponent::new(
            "vault",
            InstallPhase::InstallingVault,
            ChartRef::new("hashicorp", "vault", None),
            &namespace,
            &owner,
            |spec| &spec.vault,
        )
        .with_target(Target::stateful_set(&namespace, "vault"))
        .with_label_path("server.extraLabels")
        .with_defaults(Values(json!({
            "server": {"standalone": {"enabled": true}},
            "injector": {"enabled": false}
        }))),
    ];

    let mut components: Vec<Box<dyn Component>> = charts
        .into_iter()
        .map(|c| Box::new(c) as Box<dyn Component>)
        .collect();
    components.push(Box::new(SchemaComponent::new(installation)));
    components.push(Box::new(core(installation)));
    components.push(Box::new(workspaces(installation)));
    components
}

/// Raw-manifest component for a source name
pub fn manifest_component(
    source: &str,
    installation: &ClusterInstallation,
) -> Option<ManifestComponent> {
    match source {
        CORE_SOURCE => Some(core(installation)),
        WORKSPACES_SOURCE => Some(workspaces(installation)),
        _ => None,
    }
}

fn core(installation: &ClusterInstallation) -> ManifestComponent {
    ManifestComponent::new(
        "core",
        InstallPhase::InstallingCore,
        CORE_SOURCE,
        "shipyard-api",
        installation,
        |spec| &spec.core.component,
    )
    .with_secrets()
}

fn workspaces(installation: &ClusterInstallation) -> ManifestComponent {
    ManifestComponent::new(
        "workspaces",
        InstallPhase::InstallingWorkspaces,
        WORKSPACES_SOURCE,
        "shipyard-workspaces",
        installation,
        |spec| &spec.workspaces,
    )
}
