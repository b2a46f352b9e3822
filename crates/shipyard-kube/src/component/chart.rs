//! Chart-backed components

use async_trait::async_trait;
use serde_json::json;
use shipyard_core::Values;

use super::{Component, Context, InstallCheck};
use crate::chart::{ChartRef, ChartType};
use crate::error::{KubeError, Result};
use crate::installation::{ClusterInstallation, ClusterInstallationSpec, ComponentSpec, InstallPhase};
use crate::ownership::{self, Ownership, Target, ownership_labels};

/// Picks a component's block out of the spec
pub type SpecSelector = fn(&ClusterInstallationSpec) -> &ComponentSpec;

/// A sub-system installed as a chart release
pub struct ChartComponent {
    name: &'static str,
    phase: InstallPhase,
    chart: ChartRef,
    release: String,
    namespace: String,
    /// Namespace exists only for this component and goes with it
    owns_namespace: bool,
    target: Target,
    ready_prefix: String,
    /// Values path the chart reads extra labels from
    label_path: &'static str,
    defaults: Values,
    select: SpecSelector,
    owner: String,
}

impl ChartComponent {
    /// Create a component whose target is a Deployment named after the release
    pub fn new(
        name: &'static str,
        phase: InstallPhase,
        chart: ChartRef,
        namespace: &str,
        owner: &str,
        select: SpecSelector,
    ) -> Self {
        let release = chart.name.clone();
        Self {
            name,
            phase,
            target: Target::deployment(namespace, &release),
            ready_prefix: release.clone(),
            release,
            chart,
            namespace: namespace.to_string(),
            owns_namespace: false,
            label_path: "commonLabels",
            defaults: Values::new(),
            select,
            owner: owner.to_string(),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_ready_prefix(mut self, prefix: &str) -> Self {
        self.ready_prefix = prefix.to_string();
        self
    }

    pub fn with_label_path(mut self, path: &'static str) -> Self {
        self.label_path = path;
        self
    }

    pub fn with_defaults(mut self, defaults: Values) -> Self {
        self.defaults = defaults;
        self
    }

    /// The namespace is created for this component alone
    pub fn dedicated_namespace(mut self) -> Self {
        self.owns_namespace = true;
        self
    }

    /// Defaults, then spec overrides, then ownership labels
    pub fn values(&self, installation: &ClusterInstallation) -> Result<Values> {
        let mut values = self
            .defaults
            .merged(&(self.select)(&installation.spec).values());

        let mut labels = Values::new();
        labels.set(self.label_path, json!(ownership_labels(&self.owner)))?;
        values.merge(&labels);
        Ok(values)
    }

    fn refusal(&self, target: &Target) -> KubeError {
        KubeError::NotInstalledByOperator {
            component: self.name.to_string(),
            target: target.to_string(),
        }
    }
}

#[async_trait]
impl Component for ChartComponent {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> InstallPhase {
        self.phase
    }

    fn is_enabled(&self, installation: &ClusterInstallation) -> bool {
        (self.select)(&installation.spec).enabled
    }

    async fn installed(&self, ctx: &Context) -> Result<InstallCheck> {
        let ownership = ownership::check(ctx.cluster.as_ref(), &self.target, &self.owner).await?;
        if ownership.is_foreign() {
            return Ok(InstallCheck::Foreign {
                target: self.target.to_string(),
            });
        }

        let status = ctx
            .charts
            .release_status(&self.release, &self.namespace, &ctx.config.helm)
            .await?;
        Ok(match status {
            Some(status) if status.is_deployed() => InstallCheck::Installed,
            _ => InstallCheck::Absent,
        })
    }

    async fn install(&self, ctx: &Context, installation: &ClusterInstallation) -> Result<()> {
        let settings = &ctx.config.helm;

        let metadata = ctx.charts.load_chart(&self.chart, settings).await?;
        if metadata.chart_type == ChartType::Library {
            return Err(KubeError::ChartNotInstallable {
                chart: self.chart.to_string(),
                chart_type: metadata.chart_type.to_string(),
            });
        }

        let cluster = ctx.cluster.as_ref();
        if ownership::check(cluster, &self.target, &self.owner).await?.is_foreign() {
            return Err(self.refusal(&self.target));
        }

        let labels = ownership_labels(&self.owner);
        if cluster.create_namespace(&self.namespace, &labels).await? {
            tracing::info!(component = %self.name, namespace = %self.namespace, "created namespace");
        }

        let values = self.values(installation)?;
        ctx.charts
            .install_or_upgrade(&self.release, &self.namespace, &self.chart, &values, settings)
            .await?;

        // Charts may not copy the values' labels onto the target itself
        if cluster.label(&self.target.reference()?, &labels).await? {
            tracing::debug!(component = %self.name, target = %self.target, "labelled target");
        } else {
            tracing::warn!(
                component = %self.name,
                target = %self.target,
                "chart did not create its target, ownership is not recorded"
            );
        }

        tracing::info!(
            component = %self.name,
            release = %self.release,
            namespace = %self.namespace,
            chart = %self.chart,
            "installed chart"
        );
        Ok(())
    }

    async fn installing(&self, ctx: &Context) -> Result<bool> {
        if self.installed(ctx).await? != InstallCheck::Installed {
            return Ok(false);
        }
        let running = ctx
            .cluster
            .pod_running(&self.namespace, &self.ready_prefix)
            .await?;
        Ok(!running)
    }

    async fn uninstall(&self, ctx: &Context, _installation: &ClusterInstallation) -> Result<()> {
        let cluster = ctx.cluster.as_ref();
        let settings = &ctx.config.helm;

        let namespace = Target::namespace(&self.namespace);
        let namespace_ownership = if self.owns_namespace {
            ownership::check(cluster, &namespace, &self.owner).await?
        } else {
            Ownership::Absent
        };
        if namespace_ownership.is_foreign() {
            return Err(self.refusal(&namespace));
        }

        let ownership = ownership::check(cluster, &self.target, &self.owner).await?;
        if ownership.is_foreign() {
            return Err(self.refusal(&self.target));
        }

        let release = ctx
            .charts
            .release_status(&self.release, &self.namespace, settings)
            .await?;
        if release.is_some() || ownership == Ownership::Ours {
            ctx.charts
                .uninstall(&self.release, &self.namespace, settings)
                .await?;
            tracing::info!(component = %self.name, release = %self.release, "uninstalled chart");
        } else {
            tracing::debug!(component = %self.name, "nothing to uninstall");
        }

        if namespace_ownership == Ownership::Ours {
            cluster.delete_namespace(&self.namespace).await?;
            tracing::info!(component = %self.name, namespace = %self.namespace, "deleted namespace");
        }
        Ok(())
    }
}
