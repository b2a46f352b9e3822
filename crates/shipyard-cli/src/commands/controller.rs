//! Controller command - run the operator until a shutdown signal

use shipyard_engine::DirectorySource;
use shipyard_kube::{
    ClusterOps, Context, ControllerContext, HelmCli, HttpMatrixFetcher, KubeCluster, KubeError,
    KubeStatusStore, OperatorConfig, Orchestrator, StatusStore, Unsealer, controller,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;

pub async fn run(config: OperatorConfig, namespace: Option<&str>) -> Result<()> {
    let client = kube::Client::try_default()
        .await
        .map_err(KubeError::from)?;

    let cluster: Arc<dyn ClusterOps> = Arc::new(KubeCluster::new(client.clone()).await?);
    let matrix = HttpMatrixFetcher::new(config.matrix_url.as_str())?;
    let manifests = DirectorySource::new(&config.manifests_dir);
    info!(
        manifests = %config.manifests_dir.display(),
        matrix = %config.matrix_url,
        "operator configuration loaded"
    );

    let cancel = CancellationToken::new();
    let unsealer = if config.unseal.enabled {
        let unsealer =
            Unsealer::new(cluster.clone(), config.unseal.clone())?.with_pod_wait(config.pod_wait);
        let token = cancel.clone();
        Some(tokio::spawn(async move { unsealer.run(token).await }))
    } else {
        None
    };

    let status: Arc<dyn StatusStore> = Arc::new(KubeStatusStore::new(client.clone()));
    let ctx = Context::new(
        cluster,
        Arc::new(HelmCli::new()),
        Arc::new(manifests),
        Arc::new(matrix),
        config,
    );
    let controller_ctx = Arc::new(ControllerContext::new(
        Orchestrator::new(ctx, status.clone()),
        status,
    ));

    controller::run(client, controller_ctx, namespace).await;

    cancel.cancel();
    if let Some(handle) = unsealer {
        if let Err(e) = handle.await {
            warn!(error = %e, "vault unsealer task failed");
        }
    }
    Ok(())
}
