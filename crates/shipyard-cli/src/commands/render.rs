//! Render command - build a raw-manifest component bundle offline
//!
//! Inputs that would normally be read from the cluster (secrets, the
//! cert-manager CRD check) are replaced by placeholders.

use console::style;
use shipyard_engine::{DirectorySource, ManifestSource};
use shipyard_kube::{
    ClusterInstallation, OperatorConfig, PipelineInputs,
    component::{CORE_SOURCE, WORKSPACES_SOURCE},
    manifest_component,
};
use std::path::Path;

use crate::error::{CliError, Result};

pub fn run(
    component: &str,
    installation_path: &Path,
    config: &OperatorConfig,
    show_only: Option<&str>,
) -> Result<()> {
    let content = std::fs::read_to_string(installation_path)?;
    let installation = ClusterInstallation::from_yaml(&content).map_err(|e| {
        CliError::config(format!(
            "{} is not a ClusterInstallation: {}",
            installation_path.display(),
            e
        ))
    })?;

    let Some(component) = manifest_component(component, &installation) else {
        return Err(CliError::usage_with_help(
            format!("'{}' is not a raw-manifest component", component),
            format!("choose one of: {}, {}", CORE_SOURCE, WORKSPACES_SOURCE),
        ));
    };

    let source = DirectorySource::new(&config.manifests_dir);
    if !source.contains(component.source()) {
        return Err(CliError::config_with_help(
            format!(
                "manifest source '{}' not found under {}",
                component.source(),
                config.manifests_dir.display()
            ),
            "point --manifests-dir at the directory holding the manifest sources",
        ));
    }

    let inputs = PipelineInputs::placeholders(&installation);
    let bundle = component.build(&source, config, &inputs)?;

    let mut rendered = 0;
    for resource in &bundle {
        let id = format!("{}/{}", resource.kind(), resource.name());
        if show_only.is_some_and(|only| !id.eq_ignore_ascii_case(only)) {
            continue;
        }
        let yaml = serde_yaml::to_string(resource.body())
            .map_err(|e| CliError::render(format!("failed to serialize {}: {}", id, e)))?;
        println!("---\n# {}\n{}", id, yaml.trim_end());
        rendered += 1;
    }

    if let Some(only) = show_only {
        if rendered == 0 {
            return Err(CliError::usage_with_help(
                format!("no resource {} in component", only),
                "use Kind/name, for example Deployment/shipyard-api",
            ));
        }
    }

    eprintln!(
        "{} rendered {} of {} resources for {} in namespace {}",
        style("✓").green(),
        rendered,
        bundle.len(),
        component.source(),
        component.namespace()
    );
    Ok(())
}
