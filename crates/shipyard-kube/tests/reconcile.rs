//! End-to-end reconciliation against the in-memory cluster and chart installer

use serde_json::json;
use shipyard_core::{Resource, ResourceKey, VersionMatrix};
use shipyard_engine::DirectorySource;
use shipyard_kube::{
    ClusterInstallation, ComponentStatus, Context, InstallPhase, KubeError, MemoryStatusStore,
    MockChartInstaller, MockCluster, OperatorConfig, Orchestrator, StaticMatrix,
    component::SCHEMA_VERSION_ANNOTATION, ownership::OWNERSHIP_LABEL,
};
use std::sync::Arc;

fn manifests_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/manifests")
}

struct Harness {
    cluster: MockCluster,
    charts: MockChartInstaller,
    store: MemoryStatusStore,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new() -> Self {
        let cluster = MockCluster::new();
        let charts = MockChartInstaller::with_platform_charts().with_cluster(&cluster);
        let store = MemoryStatusStore::new();
        let matrix = VersionMatrix::from_json(r#"{"v1.0.0": "v1alpha1", "v1.4.0": "v1alpha2"}"#)
            .unwrap();
        let ctx = Context::new(
            Arc::new(cluster.clone()),
            Arc::new(charts.clone()),
            Arc::new(DirectorySource::new(manifests_path())),
            Arc::new(StaticMatrix::new(matrix)),
            OperatorConfig::default(),
        );
        Self {
            orchestrator: Orchestrator::new(ctx, Arc::new(store.clone())),
            cluster,
            charts,
            store,
        }
    }

    /// One controller pass, followed by the status update a watch would deliver
    async fn pass(&self, installation: &mut ClusterInstallation) -> Result<bool, KubeError> {
        let result = self.orchestrator.reconcile(installation).await;
        self.store.observe(installation);
        result
    }

    /// Mark every platform workload as running
    fn all_pods_running(&self) {
        for (namespace, pod) in PODS {
            self.cluster.set_pod(namespace, pod, "Running");
        }
    }

    async fn converge(&self, installation: &mut ClusterInstallation) {
        for _ in 0..20 {
            if !self.pass(installation).await.unwrap() {
                return;
            }
        }
        panic!("installation did not converge");
    }
}

const PODS: [(&str, &str); 7] = [
    ("cert-manager", "cert-manager-6f9c7d8b5-x2k4p"),
    ("platform", "postgresql-0"),
    ("platform", "minio-7b5d9c6f4-q8w2n"),
    ("platform", "redis-master-0"),
    ("platform", "vault-0"),
    ("platform", "shipyard-api-5c4b8f7d9-h7j3k"),
    ("platform", "shipyard-workspaces-8d7c6b5a4-m9n8b"),
];

fn pod_for(phase: InstallPhase) -> Option<(&'static str, &'static str)> {
    let index = match phase {
        InstallPhase::InstallingCertManager => 0,
        InstallPhase::InstallingDatabase => 1,
        InstallPhase::InstallingObjectStore => 2,
        InstallPhase::InstallingCache => 3,
        InstallPhase::InstallingVault => 4,
        InstallPhase::InstallingCore => 5,
        InstallPhase::InstallingWorkspaces => 6,
        _ => return None,
    };
    Some(PODS[index])
}

fn installation(version: &str) -> ClusterInstallation {
    let mut installation = ClusterInstallation::from_yaml(&format!(
        r#"
apiVersion: shipyard.dev/v1alpha1
kind: ClusterInstallation
metadata:
  name: main
  namespace: shipyard-system
  generation: 1
spec:
  version: {version}
  namespace: platform
  core:
    values: {{replicas: 2}}
"#
    ))
    .unwrap();
    installation.metadata.uid = Some("5e1c0c4e-8f4a-4d0e-9d51-0a7f2d6c9b11".to_string());
    installation
}

fn key(kind: &str, namespace: Option<&str>, name: &str) -> ResourceKey {
    ResourceKey {
        kind: kind.to_string(),
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

fn cert_manager_crd() -> Resource {
    Resource::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {"name": "certificates.cert-manager.io"},
    }))
    .unwrap()
}

#[tokio::test]
async fn fresh_install_walks_every_phase_in_order() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    let mut phases = Vec::new();

    for _ in 0..20 {
        let requeue = h.pass(&mut installation).await.unwrap();
        let phase = installation.phase();
        phases.push(phase);
        if !requeue {
            break;
        }
        let (namespace, pod) = pod_for(phase).expect("requeued outside an install phase");
        h.cluster.set_pod(namespace, pod, "Running");
    }

    assert_eq!(
        phases,
        vec![
            InstallPhase::InstallingCertManager,
            InstallPhase::InstallingDatabase,
            InstallPhase::InstallingObjectStore,
            InstallPhase::InstallingCache,
            InstallPhase::InstallingVault,
            InstallPhase::InstallingCore,
            InstallPhase::InstallingWorkspaces,
            InstallPhase::Running,
        ]
    );

    let status = installation.status.clone().unwrap();
    assert_eq!(status.version.as_deref(), Some("v1.5.0"));
    assert_eq!(status.components.len(), 8);
    assert!(
        status
            .components
            .values()
            .all(|c| *c == ComponentStatus::new("Ready"))
    );
    assert_eq!(h.charts.release_count(), 5);

    // vault's chart never labels its StatefulSet, the operator does
    let vault = h
        .cluster
        .get(&key("StatefulSet", Some("platform"), "vault"))
        .unwrap();
    assert_eq!(vault.label(OWNERSHIP_LABEL), Some("shipyard-system.main"));

    let crd = h
        .cluster
        .get(&key("CustomResourceDefinition", None, "workspaces.shipyard.dev"))
        .unwrap();
    assert_eq!(
        crd.annotation(SCHEMA_VERSION_ANNOTATION),
        Some("v1alpha2")
    );
    assert_eq!(crd.label(OWNERSHIP_LABEL), Some("shipyard-system.main"));

    let api = h
        .cluster
        .get(&key("Deployment", Some("platform"), "shipyard-api"))
        .unwrap();
    let containers = &api.body()["spec"]["template"]["spec"]["containers"];
    assert_eq!(containers[0]["image"], json!("ghcr.io/shipyard/api:v1.5.0"));
    assert_eq!(
        containers[1]["image"],
        json!("ghcr.io/shipyard/legacy-dashboard:v0.9.0")
    );
    assert_eq!(containers[2]["image"], json!("docker.io/library/nginx:1.27"));
    assert_eq!(api.body()["spec"]["replicas"], json!(2));
    // The installation lives in another namespace, so no owner reference
    assert!(api.body()["metadata"].get("ownerReferences").is_none());

    // cert-manager CRDs were never installed, so the Certificate is held back
    assert!(
        !h.cluster
            .contains(&key("Certificate", Some("platform"), "shipyard-api-tls"))
    );
}

#[tokio::test]
async fn converged_installation_is_left_untouched() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    h.all_pods_running();
    h.converge(&mut installation).await;

    let writes = h.store.writes();
    let installs = h.charts.operation_counts().installs;
    let applied = h.cluster.operation_counts().applied;

    for _ in 0..3 {
        assert!(!h.pass(&mut installation).await.unwrap());
    }

    assert_eq!(installation.phase(), InstallPhase::Running);
    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.charts.operation_counts().installs, installs);
    assert_eq!(h.cluster.operation_counts().applied, applied);
}

#[tokio::test]
async fn foreign_cert_manager_is_not_touched() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    h.cluster.insert(
        Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "cert-manager",
                "namespace": "cert-manager",
                "labels": {"app.kubernetes.io/managed-by": "Helm"},
            },
        }))
        .unwrap(),
    );

    assert!(h.pass(&mut installation).await.unwrap());

    assert_eq!(installation.phase(), InstallPhase::InstallingDatabase);
    assert!(h.charts.release("cert-manager", "cert-manager").is_none());
    assert_eq!(
        installation.status.as_ref().unwrap().components["cert-manager"],
        ComponentStatus::new("Unmanaged")
    );
}

#[tokio::test]
async fn partial_core_is_reapplied() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    h.cluster.insert(cert_manager_crd());
    h.all_pods_running();
    h.converge(&mut installation).await;
    assert!(
        h.cluster
            .contains(&key("Certificate", Some("platform"), "shipyard-api-tls"))
    );

    // An admin deletes two of the ten core resources
    h.cluster
        .remove(&key("ConfigMap", Some("platform"), "shipyard-api"))
        .unwrap();
    h.cluster
        .remove(&key("Service", Some("platform"), "shipyard-api"))
        .unwrap();
    let applied = h.cluster.operation_counts().applied;

    assert!(!h.pass(&mut installation).await.unwrap());

    assert_eq!(h.cluster.operation_counts().applied, applied + 10);
    assert!(
        h.cluster
            .contains(&key("ConfigMap", Some("platform"), "shipyard-api"))
    );
    assert!(
        h.cluster
            .contains(&key("Service", Some("platform"), "shipyard-api"))
    );
    assert_eq!(installation.phase(), InstallPhase::Running);
}

#[tokio::test]
async fn jwt_secret_survives_reinstall() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    h.all_pods_running();
    h.converge(&mut installation).await;

    let jwt_key = key("Secret", Some("platform"), "shipyard-jwt");
    let first = h.cluster.get(&jwt_key).unwrap().body()["data"]["secret"].clone();
    assert!(first.as_str().is_some_and(|s| !s.is_empty()));

    h.cluster
        .remove(&key("Deployment", Some("platform"), "shipyard-api"))
        .unwrap();
    h.converge(&mut installation).await;

    let second = h.cluster.get(&jwt_key).unwrap().body()["data"]["secret"].clone();
    assert_eq!(first, second);
}

#[tokio::test]
async fn version_bump_upgrades_schema_and_images() {
    let h = Harness::new();
    let mut installation = installation("v1.0.0");
    h.all_pods_running();
    h.converge(&mut installation).await;

    let crd_key = key("CustomResourceDefinition", None, "tenants.shipyard.dev");
    assert_eq!(
        h.cluster
            .get(&crd_key)
            .unwrap()
            .annotation(SCHEMA_VERSION_ANNOTATION),
        Some("v1alpha1")
    );
    let first_upgrade = installation.status.as_ref().unwrap().last_upgraded;

    installation.spec.version = "v1.5.0".to_string();
    installation.metadata.generation = Some(2);
    h.converge(&mut installation).await;

    assert_eq!(
        h.cluster
            .get(&crd_key)
            .unwrap()
            .annotation(SCHEMA_VERSION_ANNOTATION),
        Some("v1alpha2")
    );
    let api = h
        .cluster
        .get(&key("Deployment", Some("platform"), "shipyard-api"))
        .unwrap();
    assert_eq!(
        api.body()["spec"]["template"]["spec"]["containers"][0]["image"],
        json!("ghcr.io/shipyard/api:v1.5.0")
    );

    let status = installation.status.unwrap();
    assert_eq!(status.version.as_deref(), Some("v1.5.0"));
    assert_eq!(status.observed_generation, Some(2));
    assert!(status.last_upgraded >= first_upgrade);
}

#[tokio::test]
async fn cleanup_removes_owned_components() {
    let h = Harness::new();
    let mut installation = installation("v1.5.0");
    h.all_pods_running();
    h.converge(&mut installation).await;
    assert!(h.cluster.count_in("platform") > 0);

    h.orchestrator.cleanup(&installation).await.unwrap();

    assert_eq!(h.store.last().unwrap().phase, InstallPhase::Uninstalling);
    assert_eq!(h.charts.release_count(), 0);
    assert_eq!(h.cluster.count_in("platform"), 0);
    assert!(
        !h.cluster
            .contains(&key("CustomResourceDefinition", None, "workspaces.shipyard.dev"))
    );
    // cert-manager's namespace existed only for it
    assert!(!h.cluster.contains(&key("Namespace", None, "cert-manager")));
}
