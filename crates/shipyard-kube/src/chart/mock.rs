//! In-memory chart installer for testing

use async_trait::async_trait;
use serde_json::json;
use shipyard_core::{Resource, ResourceKey, Values};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::{ChartInstaller, ChartMetadata, ChartRef, ChartType, ReleaseStatus};
use crate::cluster::MockCluster;
use crate::config::HelmSettings;
use crate::error::{KubeError, Result};

/// A release held by the mock
#[derive(Debug, Clone)]
pub struct MockRelease {
    pub chart: ChartRef,
    pub status: ReleaseStatus,
    pub values: Values,
    /// Install/upgrade count
    pub revision: u32,
}

/// The main workload a chart renders
#[derive(Debug, Clone)]
pub struct MockWorkload {
    pub kind: &'static str,
    pub name: &'static str,
    /// Values path whose labels the chart copies onto the workload
    pub label_path: Option<&'static str>,
}

impl MockWorkload {
    fn key(&self, namespace: &str) -> ResourceKey {
        ResourceKey {
            kind: self.kind.to_string(),
            namespace: Some(namespace.to_string()),
            name: self.name.to_string(),
        }
    }
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChartOperationCounts {
    pub status_checks: usize,
    pub loads: usize,
    pub installs: usize,
    pub uninstalls: usize,
}

/// In-memory chart installer for testing
#[derive(Clone, Default)]
pub struct MockChartInstaller {
    /// chart name -> type
    charts: Arc<RwLock<HashMap<String, ChartType>>>,
    /// (namespace, release) -> release
    releases: Arc<RwLock<BTreeMap<(String, String), MockRelease>>>,
    operations: Arc<RwLock<ChartOperationCounts>>,
    install_error: Arc<RwLock<Option<String>>>,
    /// chart name -> workload created on install
    workloads: Arc<RwLock<HashMap<String, MockWorkload>>>,
    cluster: Option<MockCluster>,
}

impl MockChartInstaller {
    /// Create an installer that knows no charts
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an installer that knows the platform's charts
    ///
    /// The vault chart only puts `server.extraLabels` on its pod template,
    /// so its StatefulSet never carries the values' labels.
    pub fn with_platform_charts() -> Self {
        let installer = Self::new();
        let workloads = [
            ("cert-manager", "Deployment", "cert-manager", Some("global.commonLabels")),
            ("postgresql", "StatefulSet", "postgresql", Some("commonLabels")),
            ("minio", "Deployment", "minio", Some("commonLabels")),
            ("redis", "StatefulSet", "redis-master", Some("commonLabels")),
            ("vault", "StatefulSet", "vault", None),
        ];
        for (chart, kind, name, label_path) in workloads {
            installer.add_chart(chart, ChartType::Application);
            installer.add_workload(chart, MockWorkload { kind, name, label_path });
        }
        installer
    }

    /// Create and remove chart workloads in `cluster` on install and uninstall
    pub fn with_cluster(mut self, cluster: &MockCluster) -> Self {
        self.cluster = Some(cluster.clone());
        self
    }

    pub fn add_workload(&self, chart: &str, workload: MockWorkload) {
        self.workloads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chart.to_string(), workload);
    }

    pub fn add_chart(&self, name: &str, chart_type: ChartType) {
        self.charts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), chart_type);
    }

    /// Fail subsequent installs with a package manager error
    pub fn fail_installs(&self, message: Option<&str>) {
        *self
            .install_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = message.map(str::to_string);
    }

    /// Put a release in place as if installed out of band
    pub fn insert_release(&self, namespace: &str, release: &str, chart: ChartRef, status: ReleaseStatus) {
        self.releases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (namespace.to_string(), release.to_string()),
                MockRelease {
                    chart,
                    status,
                    values: Values::new(),
                    revision: 1,
                },
            );
    }

    pub fn release(&self, namespace: &str, release: &str) -> Option<MockRelease> {
        self.releases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), release.to_string()))
            .cloned()
    }

    pub fn release_count(&self) -> usize {
        self.releases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> ChartOperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn workload(&self, chart: &str) -> Option<MockWorkload> {
        self.workloads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chart)
            .cloned()
    }

    /// Render the chart's workload, merging labels into an existing one
    fn deploy_workload(&self, namespace: &str, chart: &ChartRef, values: &Values) -> Result<()> {
        let (Some(cluster), Some(workload)) = (&self.cluster, self.workload(&chart.name)) else {
            return Ok(());
        };

        let labels = workload
            .label_path
            .and_then(|path| values.get(path))
            .and_then(|labels| labels.as_object())
            .cloned()
            .unwrap_or_default();

        let mut object = match cluster.get(&workload.key(namespace)) {
            Some(live) => live,
            None => Resource::from_value(json!({
                "apiVersion": "apps/v1",
                "kind": workload.kind,
                "metadata": {"name": workload.name, "namespace": namespace},
            }))?,
        };
        for (key, value) in &labels {
            if let Some(value) = value.as_str() {
                object.set_label(key, value);
            }
        }
        cluster.insert(object);
        Ok(())
    }

    fn count(&self, f: impl FnOnce(&mut ChartOperationCounts)) {
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut ops);
    }
}

#[async_trait]
impl ChartInstaller for MockChartInstaller {
    async fn release_status(
        &self,
        release: &str,
        namespace: &str,
        _settings: &HelmSettings,
    ) -> Result<Option<ReleaseStatus>> {
        self.count(|ops| ops.status_checks += 1);
        Ok(self.release(namespace, release).map(|r| r.status))
    }

    async fn load_chart(&self, chart: &ChartRef, _settings: &HelmSettings) -> Result<ChartMetadata> {
        self.count(|ops| ops.loads += 1);
        let chart_type = self
            .charts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chart.name)
            .copied()
            .ok_or_else(|| KubeError::ChartNotFound {
                chart: chart.to_string(),
                message: "no such chart in mock repository".to_string(),
            })?;

        Ok(ChartMetadata {
            name: chart.name.clone(),
            version: chart.version.clone().unwrap_or_else(|| "0.1.0".to_string()),
            chart_type,
        })
    }

    async fn install_or_upgrade(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Values,
        _settings: &HelmSettings,
    ) -> Result<()> {
        self.count(|ops| ops.installs += 1);
        if let Some(message) = self
            .install_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(KubeError::Helm {
                action: "upgrade".to_string(),
                release: release.to_string(),
                message,
            });
        }

        self.deploy_workload(namespace, chart, values)?;

        let mut releases = self.releases.write().unwrap_or_else(PoisonError::into_inner);
        let key = (namespace.to_string(), release.to_string());
        let revision = releases.get(&key).map_or(1, |r| r.revision + 1);
        releases.insert(
            key,
            MockRelease {
                chart: chart.clone(),
                status: ReleaseStatus::Deployed,
                values: values.clone(),
                revision,
            },
        );
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str, _settings: &HelmSettings) -> Result<()> {
        self.count(|ops| ops.uninstalls += 1);
        let removed = self
            .releases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(namespace.to_string(), release.to_string()));

        if let (Some(cluster), Some(removed)) = (&self.cluster, removed) {
            if let Some(workload) = self.workload(&removed.chart.name) {
                cluster.remove(&workload.key(namespace));
            }
        }
        Ok(())
    }
}
