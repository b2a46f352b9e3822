//! ClusterInstallation controller
//!
//! Watches ClusterInstallation objects and hands each one to the
//! [`Orchestrator`]. A finalizer keeps the object around until cleanup
//! has removed what it owns.

use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::error::{ErrorKind, KubeError, Result};
use crate::installation::ClusterInstallation;
use crate::orchestrator::Orchestrator;
use crate::status::StatusStore;

/// Finalizer guarding cleanup of owned components
pub const FINALIZER: &str = "shipyard.dev/cleanup";

/// Shared state for the controller
pub struct ControllerContext {
    orchestrator: Orchestrator,
    status: Arc<dyn StatusStore>,
}

impl ControllerContext {
    pub fn new(orchestrator: Orchestrator, status: Arc<dyn StatusStore>) -> Self {
        Self {
            orchestrator,
            status,
        }
    }

    fn config(&self) -> &OperatorConfig {
        &self.orchestrator.context().config
    }
}

fn has_finalizer(installation: &ClusterInstallation) -> bool {
    installation.finalizers().iter().any(|f| f == FINALIZER)
}

/// Reconcile one ClusterInstallation
pub async fn reconcile(
    installation: Arc<ClusterInstallation>,
    ctx: Arc<ControllerContext>,
) -> Result<Action> {
    let name = installation.name_any();

    if installation.metadata.deletion_timestamp.is_some() {
        if has_finalizer(&installation) {
            info!(installation = %name, "installation deleted, cleaning up");
            ctx.orchestrator.cleanup(&installation).await?;
            ctx.status.remove_finalizer(&installation, FINALIZER).await?;
            info!(installation = %name, "cleanup complete");
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&installation) {
        debug!(installation = %name, "adding finalizer");
        ctx.status.add_finalizer(&installation, FINALIZER).await?;
    }

    let requeue = ctx.orchestrator.reconcile(&installation).await?;
    if requeue {
        Ok(Action::requeue(ctx.config().requeue_interval))
    } else {
        Ok(Action::await_change())
    }
}

/// Decide what to do after a failed reconciliation
///
/// Fatal errors wait for the object to change; everything else retries.
pub fn error_policy(
    installation: Arc<ClusterInstallation>,
    error: &KubeError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let name = installation.name_any();
    match error.kind() {
        ErrorKind::Fatal => {
            error!(installation = %name, %error, "reconciliation failed, waiting for a spec change");
            Action::await_change()
        }
        ErrorKind::Transient | ErrorKind::Drift | ErrorKind::Foreign => {
            warn!(installation = %name, %error, "reconciliation failed, will retry");
            Action::requeue(ctx.config().error_requeue_interval)
        }
    }
}

/// Watch ClusterInstallations until a shutdown signal arrives
///
/// Watches every namespace unless `namespace` is given.
pub async fn run(client: Client, ctx: Arc<ControllerContext>, namespace: Option<&str>) {
    let installations: Api<ClusterInstallation> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    info!(namespace = namespace.unwrap_or("*"), "starting ClusterInstallation controller");

    Controller::new(installations, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => debug!(?action, "reconciliation completed"),
                Err(e) => debug!(error = ?e, "reconciliation error"),
            }
        })
        .await;

    info!("controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::MockChartInstaller;
    use crate::cluster::MockCluster;
    use crate::component::Context;
    use crate::installation::InstallPhase;
    use crate::matrix::StaticMatrix;
    use crate::status::MemoryStatusStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use shipyard_engine::StaticSource;
    use std::time::Duration;

    const CRD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: workspaces.shipyard.dev
spec:
  group: shipyard.dev
  names: {kind: Workspace, plural: workspaces}
  scope: Namespaced
  versions:
    - {name: v1alpha1, served: true, storage: true}
"#;

    fn installation() -> ClusterInstallation {
        ClusterInstallation::from_yaml(
            r#"
apiVersion: shipyard.dev/v1alpha1
kind: ClusterInstallation
metadata: {name: main, namespace: platform, generation: 1}
spec:
  version: v1.0.0
  database: {enabled: false}
  objectStore: {enabled: false}
  cache: {enabled: false}
  vault: {enabled: false}
  core: {enabled: false}
  workspaces: {enabled: false}
"#,
        )
        .unwrap()
    }

    fn context(store: &MemoryStatusStore) -> Arc<ControllerContext> {
        let config = OperatorConfig {
            requeue_interval: Duration::from_secs(7),
            error_requeue_interval: Duration::from_secs(11),
            ..Default::default()
        };
        let ctx = Context::new(
            Arc::new(MockCluster::new()),
            Arc::new(MockChartInstaller::with_platform_charts()),
            Arc::new(StaticSource::new().with("crds/v1alpha1", CRD)),
            Arc::new(StaticMatrix::from_pairs(&[("v1.0.0", "v1alpha1")]).unwrap()),
            config,
        );
        let store: Arc<dyn StatusStore> = Arc::new(store.clone());
        Arc::new(ControllerContext::new(
            Orchestrator::new(ctx, store.clone()),
            store,
        ))
    }

    #[tokio::test]
    async fn test_reconcile_adds_finalizer_and_requeues() {
        let store = MemoryStatusStore::new();
        let ctx = context(&store);

        let action = reconcile(Arc::new(installation()), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(7)));
        assert_eq!(store.finalizers(), vec![FINALIZER.to_string()]);
        assert_eq!(
            store.last().unwrap().phase,
            InstallPhase::InstallingCertManager
        );
    }

    #[tokio::test]
    async fn test_deletion_runs_cleanup_and_releases_finalizer() {
        let store = MemoryStatusStore::new();
        let ctx = context(&store);
        let mut installation = installation();
        reconcile(Arc::new(installation.clone()), ctx.clone())
            .await
            .unwrap();
        store.observe(&mut installation);
        installation.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let action = reconcile(Arc::new(installation), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(store.finalizers().is_empty());
        assert_eq!(store.last().unwrap().phase, InstallPhase::Uninstalling);
    }

    #[tokio::test]
    async fn test_deleted_without_finalizer_is_ignored() {
        let store = MemoryStatusStore::new();
        let ctx = context(&store);
        let mut installation = installation();
        installation.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let action = reconcile(Arc::new(installation), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_error_policy_by_kind() {
        let store = MemoryStatusStore::new();
        let ctx = context(&store);
        let installation = Arc::new(installation());

        let fatal = KubeError::InvalidConfig("bad values".into());
        assert_eq!(
            error_policy(installation.clone(), &fatal, ctx.clone()),
            Action::await_change()
        );

        let transient = KubeError::Timeout("api server".into());
        assert_eq!(
            error_policy(installation, &transient, ctx),
            Action::requeue(Duration::from_secs(11))
        );
    }
}
