//! Bounded wait for a pod to reach Running
//!
//! Used outside the reconciliation loop, which never blocks on
//! convergence. The wait ends on success, on timeout, or when the token
//! is cancelled.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterOps;
use crate::config::PodWaitConfig;
use crate::error::{KubeError, Result};

/// Poll until a pod whose name starts with `prefix` is Running
pub async fn wait_for_pod_running(
    cluster: &dyn ClusterOps,
    namespace: &str,
    prefix: &str,
    config: &PodWaitConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = Instant::now() + config.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if cluster.pod_running(namespace, prefix).await? {
            tracing::debug!(namespace, prefix, attempts, "pod is running");
            return Ok(());
        }

        if Instant::now() + config.interval > deadline {
            return Err(KubeError::Timeout(format!(
                "{:?} waiting for pod {}/{}* after {} attempts",
                config.timeout, namespace, prefix, attempts
            )));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(KubeError::Cancelled(format!(
                    "wait for pod {}/{}*",
                    namespace, prefix
                )));
            }
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use std::time::Duration;

    fn fast() -> PodWaitConfig {
        PodWaitConfig {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_returns_when_running() {
        let cluster = MockCluster::new();
        cluster.set_pod("vault", "vault-0", "Running");

        wait_for_pod_running(&cluster, "vault", "vault", &fast(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_times_out() {
        let cluster = MockCluster::new();
        cluster.set_pod("vault", "vault-0", "Pending");

        let err = wait_for_pod_running(&cluster, "vault", "vault", &fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_observes_later_transition() {
        let cluster = MockCluster::new();
        cluster.set_pod("vault", "vault-0", "Pending");

        let flip = cluster.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flip.set_pod("vault", "vault-0", "Running");
        });

        let config = PodWaitConfig {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(10),
        };
        wait_for_pod_running(&cluster, "vault", "vault", &config, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cluster = MockCluster::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let config = PodWaitConfig {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(10),
        };
        let err = wait_for_pod_running(&cluster, "vault", "vault", &config, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Cancelled(_)));
    }
}
