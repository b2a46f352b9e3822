//! Reconciliation of one ClusterInstallation
//!
//! Each pass walks the components in dependency order and advances the
//! first one that is not settled. A pass never starts a component before
//! every earlier one is installed or installing, so a fresh install takes
//! several passes, one requeue per component. The first pass after a spec
//! change re-applies every installed component so new values and versions
//! reach the cluster.

use chrono::Utc;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::component::{Component, Context, InstallCheck, components};
use crate::error::{ErrorKind, Result};
use crate::installation::{
    ClusterInstallation, ClusterInstallationStatus, ComponentStatus, InstallPhase,
};
use crate::status::StatusStore;

const STATE_INSTALLING: &str = "Installing";
const STATE_READY: &str = "Ready";
const STATE_UNMANAGED: &str = "Unmanaged";

/// What a component needs after one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Settled, move on to the next component
    Next,
    /// Waiting on a readiness signal, stop and requeue
    Wait,
}

/// Drives installations towards their desired state
pub struct Orchestrator {
    ctx: Context,
    status: Arc<dyn StatusStore>,
}

impl Orchestrator {
    pub fn new(ctx: Context, status: Arc<dyn StatusStore>) -> Self {
        Self { ctx, status }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run one reconciliation pass
    ///
    /// Returns whether the installation should be looked at again soon.
    /// Errors are recorded in the status message before being returned;
    /// fatal ones also move the phase to `Failed`.
    pub async fn reconcile(&self, installation: &ClusterInstallation) -> Result<bool> {
        let name = installation.name_any();
        let observed = installation.status.clone().unwrap_or_default();
        let mut status = observed.clone();
        let generation = installation.metadata.generation;

        let spec_changed =
            status.observed_generation.is_some() && status.observed_generation != generation;
        if status.observed_generation != generation {
            if spec_changed {
                info!(installation = %name, ?generation, "spec changed, re-applying components");
            }
            status.phase = InstallPhase::Pending;
            status.observed_generation = generation;
        } else if status.phase == InstallPhase::Failed {
            debug!(installation = %name, "failed at this generation, waiting for a spec change");
            return Ok(false);
        }

        status.message = None;
        let result = self.advance(installation, &mut status, spec_changed).await;

        if let Err(e) = &result {
            status.message = Some(e.to_string());
            if e.kind() == ErrorKind::Fatal {
                status.phase = InstallPhase::Failed;
            }
        }
        if status != observed {
            self.status.write_status(installation, &status).await?;
        }
        result
    }

    async fn advance(
        &self,
        installation: &ClusterInstallation,
        status: &mut ClusterInstallationStatus,
        refresh: bool,
    ) -> Result<bool> {
        for component in components(installation) {
            let name = component.name().to_string();
            if !component.is_enabled(installation) {
                debug!(component = %name, "disabled, skipping");
                status.components.remove(&name);
                continue;
            }

            let step = self
                .step(component.as_ref(), installation, status, refresh)
                .await?;
            if step == Step::Wait {
                return Ok(true);
            }
        }

        if status.phase != InstallPhase::Running {
            info!(installation = %installation.name_any(), "installation is running");
        }
        status.phase = InstallPhase::Running;
        if status.version.as_deref() != Some(installation.spec.version.as_str()) {
            status.version = Some(installation.spec.version.clone());
            status.last_upgraded = Some(Utc::now());
        }
        Ok(false)
    }

    async fn step(
        &self,
        component: &dyn Component,
        installation: &ClusterInstallation,
        status: &mut ClusterInstallationStatus,
        refresh: bool,
    ) -> Result<Step> {
        let name = component.name().to_string();
        let check = component.installed(&self.ctx).await?;
        let reapply = refresh && check == InstallCheck::Installed;

        if check.is_foreign() {
            if let Some(e) = check.to_error(&name) {
                warn!(component = %name, error = %e, "leaving foreign component alone");
            }
            status
                .components
                .insert(name, ComponentStatus::new(STATE_UNMANAGED));
            return Ok(Step::Next);
        }

        if check.is_installed() && !reapply {
            if component.installing(&self.ctx).await? {
                self.mark_installing(component, status);
                return Ok(Step::Wait);
            }
            status
                .components
                .insert(name, ComponentStatus::new(STATE_READY));
            return Ok(Step::Next);
        }

        if let Some(drift) = check.to_error(&name) {
            warn!(error = %drift, "reinstalling after drift");
        }
        if !reapply && component.installing(&self.ctx).await? {
            self.mark_installing(component, status);
            return Ok(Step::Wait);
        }

        info!(component = %name, %check, "installing component");
        component.install(&self.ctx, installation).await?;
        self.mark_installing(component, status);

        if component.installing(&self.ctx).await? {
            return Ok(Step::Wait);
        }
        status
            .components
            .insert(name, ComponentStatus::new(STATE_READY));
        Ok(Step::Next)
    }

    fn mark_installing(&self, component: &dyn Component, status: &mut ClusterInstallationStatus) {
        if status.phase != component.phase() {
            info!(component = component.name(), phase = %component.phase(), "phase changed");
        }
        status.phase = component.phase();
        status.components.insert(
            component.name().to_string(),
            ComponentStatus::new(STATE_INSTALLING),
        );
    }

    /// Remove everything this installation owns, in reverse order
    ///
    /// Foreign components are skipped. Returns once every owned component
    /// is gone; any other error stops the teardown and is returned.
    pub async fn cleanup(&self, installation: &ClusterInstallation) -> Result<()> {
        let name = installation.name_any();
        let mut status = installation.status.clone().unwrap_or_default();
        if status.phase != InstallPhase::Uninstalling {
            status.phase = InstallPhase::Uninstalling;
            self.status.write_status(installation, &status).await?;
        }

        let mut components = components(installation);
        components.reverse();
        for component in components {
            if !component.is_enabled(installation) {
                continue;
            }
            match component.uninstall(&self.ctx, installation).await {
                Ok(()) => {
                    info!(installation = %name, component = component.name(), "component removed");
                    status.components.remove(component.name());
                }
                Err(e) if e.kind() == ErrorKind::Foreign => {
                    warn!(installation = %name, error = %e, "not removing foreign component");
                }
                Err(e) => {
                    status.message = Some(e.to_string());
                    self.status.write_status(installation, &status).await?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
