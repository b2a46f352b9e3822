//! Vault auto-unseal
//!
//! A periodic side task, independent of reconciliation. Each tick reads
//! the seal status and, when sealed, submits the stored unseal keys one
//! at a time until vault reports it is unsealed.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterOps;
use crate::config::{PodWaitConfig, UnsealConfig};
use crate::error::{KubeError, Result};
use crate::wait::wait_for_pod_running;

/// Key under which the unseal keys are stored in the Secret
const KEYS_FIELD: &str = "keys";

/// Body of `/v1/sys/seal-status` and `/v1/sys/unseal`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SealStatus {
    pub sealed: bool,
    #[serde(default)]
    pub initialized: bool,
    /// Keys required
    #[serde(default, rename = "t")]
    pub threshold: u32,
    /// Keys submitted so far
    #[serde(default)]
    pub progress: u32,
}

/// Result of one unseal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsealOutcome {
    AlreadyUnsealed,
    /// Vault has not been initialized; nothing to unseal with
    Uninitialized,
    Unsealed { keys_used: usize },
    /// Every key was submitted and vault is still sealed
    StillSealed { progress: u32, threshold: u32 },
}

pub struct Unsealer {
    client: reqwest::Client,
    cluster: Arc<dyn ClusterOps>,
    config: UnsealConfig,
    pod_wait: PodWaitConfig,
}

impl Unsealer {
    pub fn new(cluster: Arc<dyn ClusterOps>, config: UnsealConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            cluster,
            config,
            pod_wait: PodWaitConfig::default(),
        })
    }

    /// Bound for each wait on the vault pod before polling starts
    pub fn with_pod_wait(mut self, pod_wait: PodWaitConfig) -> Self {
        self.pod_wait = pod_wait;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.address.trim_end_matches('/'), path)
    }

    pub async fn seal_status(&self) -> Result<SealStatus> {
        Ok(self
            .client
            .get(self.url("/v1/sys/seal-status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn submit(&self, key: &str) -> Result<SealStatus> {
        Ok(self
            .client
            .put(self.url("/v1/sys/unseal"))
            .json(&json!({ "key": key }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let raw = self
            .cluster
            .secret_value(
                &self.config.keys_namespace,
                &self.config.keys_secret,
                KEYS_FIELD,
            )
            .await?
            .ok_or_else(|| {
                KubeError::InvalidConfig(format!(
                    "secret {}/{} has no '{}' entry",
                    self.config.keys_namespace, self.config.keys_secret, KEYS_FIELD
                ))
            })?;

        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Check once and unseal if needed
    pub async fn unseal_once(&self) -> Result<UnsealOutcome> {
        let status = self.seal_status().await?;
        if !status.initialized {
            return Ok(UnsealOutcome::Uninitialized);
        }
        if !status.sealed {
            return Ok(UnsealOutcome::AlreadyUnsealed);
        }

        let keys = self.keys().await?;
        let mut last = status;
        for (i, key) in keys.iter().enumerate() {
            last = self.submit(key).await?;
            debug!(progress = last.progress, threshold = last.threshold, "submitted unseal key");
            if !last.sealed {
                return Ok(UnsealOutcome::Unsealed { keys_used: i + 1 });
            }
        }

        Ok(UnsealOutcome::StillSealed {
            progress: last.progress,
            threshold: last.threshold,
        })
    }

    /// Wait for the vault pod, then poll until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        info!(address = %self.config.address, interval = ?self.config.interval, "starting vault unsealer");

        loop {
            match wait_for_pod_running(
                self.cluster.as_ref(),
                &self.config.pod_namespace,
                &self.config.pod_prefix,
                &self.pod_wait,
                &cancel,
            )
            .await
            {
                Ok(()) => break,
                Err(KubeError::Cancelled(_)) => {
                    info!("vault unsealer stopped");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "vault pod not running yet");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("vault unsealer stopped");
                            return;
                        }
                        _ = tokio::time::sleep(self.pod_wait.interval) => {}
                    }
                }
            }
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("vault unsealer stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.unseal_once().await {
                Ok(UnsealOutcome::Unsealed { keys_used }) => {
                    info!(keys_used, "vault unsealed");
                }
                Ok(UnsealOutcome::StillSealed {
                    progress,
                    threshold,
                }) => {
                    warn!(progress, threshold, "vault still sealed after submitting every key");
                }
                Ok(outcome) => debug!(?outcome, "vault seal check"),
                Err(e) => warn!(error = %e, "vault unseal attempt failed"),
            }
        }
    }
}
