//! Crd command - print the ClusterInstallation CustomResourceDefinition

use kube::CustomResourceExt;
use shipyard_kube::ClusterInstallation;

use crate::error::{CliError, Result};

pub fn run() -> Result<()> {
    let crd = serde_yaml::to_string(&ClusterInstallation::crd())
        .map_err(|e| CliError::render(format!("failed to serialize CRD: {}", e)))?;
    print!("{}", crd);
    Ok(())
}
