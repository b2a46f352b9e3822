//! ChartInstaller backed by the helm binary

use async_trait::async_trait;
use serde::Deserialize;
use shipyard_core::Values;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ChartInstaller, ChartMetadata, ChartRef, ChartType, ReleaseStatus};
use crate::config::HelmSettings;
use crate::error::{KubeError, Result};

/// Runs `helm` as a child process
#[derive(Debug, Clone, Default)]
pub struct HelmCli;

/// The part of `helm status -o json` we read
#[derive(Debug, Deserialize)]
struct StatusOutput {
    info: StatusInfo,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    status: String,
}

impl HelmCli {
    pub fn new() -> Self {
        Self
    }

    fn command(settings: &HelmSettings) -> Command {
        let mut cmd = Command::new(&settings.binary);
        if let Some(context) = &settings.kube_context {
            cmd.args(["--kube-context", context]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn repository_url<'a>(chart: &ChartRef, settings: &'a HelmSettings) -> Result<&'a str> {
        settings
            .repository_url(&chart.repository)
            .ok_or_else(|| KubeError::ChartNotFound {
                chart: chart.to_string(),
                message: format!("repository '{}' is not configured", chart.repository),
            })
    }

    async fn run(mut cmd: Command, action: &str, release: &str) -> Result<Output> {
        cmd.output().await.map_err(|e| KubeError::Helm {
            action: action.to_string(),
            release: release.to_string(),
            message: format!("failed to run helm: {}", e),
        })
    }

    fn stderr(output: &Output) -> String {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    }

    fn is_not_found(output: &Output) -> bool {
        Self::stderr(output).contains("not found")
    }
}

#[async_trait]
impl ChartInstaller for HelmCli {
    async fn release_status(
        &self,
        release: &str,
        namespace: &str,
        settings: &HelmSettings,
    ) -> Result<Option<ReleaseStatus>> {
        let mut cmd = Self::command(settings);
        cmd.args(["status", release, "--namespace", namespace, "--output", "json"]);

        let output = Self::run(cmd, "status", release).await?;
        if !output.status.success() {
            if Self::is_not_found(&output) {
                return Ok(None);
            }
            return Err(KubeError::Helm {
                action: "status".to_string(),
                release: release.to_string(),
                message: Self::stderr(&output),
            });
        }

        let parsed: StatusOutput = serde_json::from_slice(&output.stdout)?;
        Ok(Some(ReleaseStatus::parse(&parsed.info.status)))
    }

    async fn load_chart(&self, chart: &ChartRef, settings: &HelmSettings) -> Result<ChartMetadata> {
        let url = Self::repository_url(chart, settings)?;

        let mut cmd = Self::command(settings);
        cmd.args(["show", "chart", &chart.name, "--repo", url]);
        if let Some(version) = &chart.version {
            cmd.args(["--version", version]);
        }

        let output = Self::run(cmd, "show chart", &chart.name).await?;
        if !output.status.success() {
            return Err(KubeError::ChartNotFound {
                chart: chart.to_string(),
                message: Self::stderr(&output),
            });
        }

        let metadata: ChartMetadata = serde_yaml::from_slice(&output.stdout)?;
        tracing::debug!(
            chart = %chart,
            version = %metadata.version,
            chart_type = %metadata.chart_type,
            "loaded chart"
        );
        Ok(metadata)
    }

    async fn install_or_upgrade(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Values,
        settings: &HelmSettings,
    ) -> Result<()> {
        let url = Self::repository_url(chart, settings)?;
        let timeout = format!("{}s", settings.timeout.as_secs());

        let mut cmd = Self::command(settings);
        cmd.args(["upgrade", "--install", release, &chart.name])
            .args(["--repo", url, "--namespace", namespace])
            .args(["--timeout", timeout.as_str(), "--values", "-"]);
        if let Some(version) = &chart.version {
            cmd.args(["--version", version]);
        }
        cmd.args(&settings.extra_args);
        cmd.stdin(Stdio::piped());

        let values_yaml = values.to_yaml()?;
        let spawn_error = |e: std::io::Error| KubeError::Helm {
            action: "upgrade".to_string(),
            release: release.to_string(),
            message: format!("failed to run helm: {}", e),
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(values_yaml.as_bytes())
                .await
                .map_err(spawn_error)?;
            // closing stdin ends the values document
        }
        let output = child.wait_with_output().await.map_err(spawn_error)?;

        if !output.status.success() {
            return Err(KubeError::Helm {
                action: "upgrade".to_string(),
                release: release.to_string(),
                message: Self::stderr(&output),
            });
        }

        tracing::info!(release, namespace, chart = %chart, "helm release installed");
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str, settings: &HelmSettings) -> Result<()> {
        let mut cmd = Self::command(settings);
        cmd.args(["uninstall", release, "--namespace", namespace]);

        let output = Self::run(cmd, "uninstall", release).await?;
        if !output.status.success() && !Self::is_not_found(&output) {
            return Err(KubeError::Helm {
                action: "uninstall".to_string(),
                release: release.to_string(),
                message: Self::stderr(&output),
            });
        }

        tracing::info!(release, namespace, "helm release uninstalled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_output_parse() {
        let json = r#"{"name":"redis","info":{"status":"deployed","description":"Install complete"},"version":1}"#;
        let parsed: StatusOutput = serde_json::from_str(json).unwrap();
        assert_eq!(ReleaseStatus::parse(&parsed.info.status), ReleaseStatus::Deployed);
    }

    #[test]
    fn test_unknown_repository_is_chart_not_found() {
        let settings = HelmSettings::default();
        let chart = ChartRef::new("nowhere", "thing", None);
        let err = HelmCli::repository_url(&chart, &settings).unwrap_err();
        assert!(matches!(err, KubeError::ChartNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transient() {
        let settings = HelmSettings {
            binary: "/nonexistent/helm".into(),
            ..Default::default()
        };
        let err = HelmCli::new()
            .release_status("redis", "platform", &settings)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_library_chart_type_parses() {
        let meta: ChartMetadata =
            serde_yaml::from_str("apiVersion: v2\nname: common\nversion: 2.19.0\ntype: library\n")
                .unwrap();
        assert_eq!(meta.chart_type, ChartType::Library);
    }
}
