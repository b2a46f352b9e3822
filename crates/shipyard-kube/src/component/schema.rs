//! Platform CRD schema component
//!
//! The schema version comes from the compatibility matrix for the target
//! platform version. CRDs are rendered from the `crds/<schema version>`
//! manifest source and stamped with the schema version they carry.

use async_trait::async_trait;
use kube::ResourceExt;
use shipyard_core::{ManifestBundle, Resource, compare_api_versions};
use shipyard_engine::transform::LabelFilter;
use shipyard_engine::{InstallationInfo, Pipeline, RenderContext};
use std::cmp::Ordering;
use tokio::sync::OnceCell;

use super::{Component, Context, InstallCheck};
use crate::error::{KubeError, Result};
use crate::installation::{ClusterInstallation, InstallPhase};
use crate::matrix::resolve_schema_version;
use crate::ownership::{self, Ownership, ownership_labels};

/// Annotation recording the schema version a CRD was installed from
pub const SCHEMA_VERSION_ANNOTATION: &str = "shipyard.dev/schema-version";

/// Manifest source directory holding one subdirectory per schema version
const SCHEMA_SOURCE: &str = "crds";

/// The platform's own CRDs
pub struct SchemaComponent {
    version: String,
    installation_name: String,
    namespace: String,
    owner: String,
    /// Resolved once per pass
    schema: OnceCell<String>,
}

impl SchemaComponent {
    pub fn new(installation: &ClusterInstallation) -> Self {
        Self {
            version: installation.spec.version.clone(),
            installation_name: installation.name_any(),
            namespace: installation.target_namespace(),
            owner: installation.owner_id(),
            schema: OnceCell::new(),
        }
    }

    /// Schema version for the target platform version
    pub async fn schema_version(&self, ctx: &Context) -> Result<&str> {
        let schema = self
            .schema
            .get_or_try_init(|| resolve_schema_version(ctx.matrix.as_ref(), &self.version))
            .await?;
        Ok(schema.as_str())
    }

    async fn render(&self, ctx: &Context) -> Result<(String, ManifestBundle)> {
        let schema = self.schema_version(ctx).await?.to_string();
        let source = format!("{}/{}", SCHEMA_SOURCE, schema);
        let context = RenderContext::new(
            Default::default(),
            InstallationInfo {
                name: self.installation_name.clone(),
                namespace: self.namespace.clone(),
                version: self.version.clone(),
            },
        );

        let bundle = ctx.manifests.load(&source, &context)?;
        if let Some(other) = bundle
            .iter()
            .find(|r| r.kind() != "CustomResourceDefinition")
        {
            return Err(KubeError::InvalidConfig(format!(
                "schema source {} contains {} {}",
                source,
                other.kind(),
                other.name()
            )));
        }
        Ok((schema, bundle))
    }

    fn stamp(&self, schema: &str, bundle: ManifestBundle) -> ManifestBundle {
        let labelled = Pipeline::new()
            .with(LabelFilter::from_labels(ownership_labels(&self.owner)))
            .run(bundle);
        labelled
            .into_iter()
            .map(|mut crd| {
                crd.set_annotation(SCHEMA_VERSION_ANNOTATION, schema);
                crd
            })
            .collect()
    }

    async fn check(&self, ctx: &Context) -> Result<InstallCheck> {
        let (wanted, bundle) = self.render(ctx).await?;
        let mut missing = 0;
        let mut outdated = None;

        for crd in &bundle {
            let Some(live) = ctx.cluster.metadata(crd).await? else {
                missing += 1;
                continue;
            };
            if ownership::classify(&live.labels, &self.owner) == Ownership::Foreign {
                return Ok(InstallCheck::Foreign {
                    target: format!("CustomResourceDefinition {}", crd.name()),
                });
            }
            let installed = live
                .annotations
                .get(SCHEMA_VERSION_ANNOTATION)
                .cloned()
                .unwrap_or_default();
            if installed != wanted {
                outdated = Some(installed);
            }
        }

        Ok(match (missing, outdated) {
            (0, None) => InstallCheck::Installed,
            (n, _) if n == bundle.len() => InstallCheck::Absent,
            (0, Some(installed)) => InstallCheck::Outdated { installed, wanted },
            (n, _) => InstallCheck::Partial {
                missing: n,
                expected: bundle.len(),
            },
        })
    }
}

#[async_trait]
impl Component for SchemaComponent {
    fn name(&self) -> &str {
        "crds"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::InstallingCrds
    }

    fn is_enabled(&self, _installation: &ClusterInstallation) -> bool {
        true
    }

    async fn installed(&self, ctx: &Context) -> Result<InstallCheck> {
        let check = self.check(ctx).await?;
        tracing::debug!(component = "crds", %check, "checked schema");
        Ok(check)
    }

    async fn install(&self, ctx: &Context, _installation: &ClusterInstallation) -> Result<()> {
        match self.check(ctx).await? {
            InstallCheck::Installed => {
                let schema = self.schema_version(ctx).await?;
                tracing::debug!(component = "crds", schema, "schema already installed");
                return Ok(());
            }
            InstallCheck::Foreign { target } => {
                return Err(KubeError::NotInstalledByOperator {
                    component: "crds".to_string(),
                    target,
                });
            }
            InstallCheck::Outdated { installed, wanted }
                if compare_api_versions(&installed, &wanted) == Ordering::Greater =>
            {
                tracing::warn!(component = "crds", %installed, %wanted, "downgrading schema");
            }
            _ => {}
        }

        let (schema, bundle) = self.render(ctx).await?;
        let bundle = self.stamp(&schema, bundle);
        let summary = ctx.cluster.apply(&bundle).await?.into_result("crds")?;

        tracing::info!(component = "crds", schema = %schema, summary = %summary.summary(), "installed schema");
        Ok(())
    }

    async fn installing(&self, ctx: &Context) -> Result<bool> {
        let (_, bundle) = self.render(ctx).await?;
        for crd in &bundle {
            if ctx.cluster.crd_exists(crd.name()).await?
                && !ctx.cluster.crd_established(crd.name()).await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn uninstall(&self, ctx: &Context, _installation: &ClusterInstallation) -> Result<()> {
        let (_, bundle) = self.render(ctx).await?;

        let mut owned: Vec<Resource> = Vec::new();
        for crd in bundle {
            let Some(live) = ctx.cluster.metadata(&crd).await? else {
                continue;
            };
            match ownership::classify(&live.labels, &self.owner) {
                Ownership::Ours => owned.push(crd),
                _ => {
                    return Err(KubeError::NotInstalledByOperator {
                        component: "crds".to_string(),
                        target: format!("CustomResourceDefinition {}", crd.name()),
                    });
                }
            }
        }

        let summary = ctx.cluster.delete(&ManifestBundle::new(owned)).await?;
        tracing::info!(component = "crds", summary = %summary.summary(), "deleted schema");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::MockChartInstaller;
    use crate::cluster::MockCluster;
    use crate::config::OperatorConfig;
    use crate::error::ErrorKind;
    use crate::matrix::StaticMatrix;
    use serde_json::json;
    use shipyard_engine::StaticSource;
    use std::sync::Arc;

    fn crd(group_version: &str) -> String {
        format!(
            r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: workspaces.shipyard.dev
spec:
  group: shipyard.dev
  names: {{kind: Workspace, plural: workspaces}}
  scope: Namespaced
  versions:
    - name: {group_version}
      served: true
      storage: true
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: tenants.shipyard.dev
spec:
  group: shipyard.dev
  names: {{kind: Tenant, plural: tenants}}
  scope: Namespaced
  versions:
    - name: {group_version}
      served: true
      storage: true
"#
        )
    }

    fn installation(version: &str) -> ClusterInstallation {
        ClusterInstallation::from_yaml(&format!(
            "apiVersion: shipyard.dev/v1alpha1\nkind: ClusterInstallation\nmetadata: {{name: main, namespace: platform}}\nspec:\n  version: {}\n",
            version
        ))
        .unwrap()
    }

    fn context(cluster: &MockCluster) -> Context {
        let source = StaticSource::new()
            .with("crds/v1alpha1", crd("v1alpha1"))
            .with("crds/v1alpha2", crd("v1alpha2"));
        Context::new(
            Arc::new(cluster.clone()),
            Arc::new(MockChartInstaller::new()),
            Arc::new(source),
            Arc::new(
                StaticMatrix::from_pairs(&[("v1.0.0", "v1alpha1"), ("v2.0.0", "v1alpha2")])
                    .unwrap(),
            ),
            OperatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_install_resolves_through_matrix() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let installation = installation("v1.5.0");
        let schema = SchemaComponent::new(&installation);

        assert_eq!(schema.schema_version(&ctx).await.unwrap(), "v1alpha1");
        assert_eq!(schema.installed(&ctx).await.unwrap(), InstallCheck::Absent);

        schema.install(&ctx, &installation).await.unwrap();
        assert_eq!(schema.installed(&ctx).await.unwrap(), InstallCheck::Installed);
        assert_eq!(cluster.operation_counts().applied, 2);

        // same version again is a no-op
        schema.install(&ctx, &installation).await.unwrap();
        assert_eq!(cluster.operation_counts().applied, 2);
    }

    #[tokio::test]
    async fn test_upgrade_detects_outdated_schema() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let old = installation("v1.5.0");
        SchemaComponent::new(&old).install(&ctx, &old).await.unwrap();

        let new = installation("v2.1.0");
        let schema = SchemaComponent::new(&new);
        assert_eq!(
            schema.installed(&ctx).await.unwrap(),
            InstallCheck::Outdated {
                installed: "v1alpha1".into(),
                wanted: "v1alpha2".into()
            }
        );
        schema.install(&ctx, &new).await.unwrap();
        assert_eq!(schema.installed(&ctx).await.unwrap(), InstallCheck::Installed);
    }

    #[tokio::test]
    async fn test_develop_uses_latest_schema() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let schema = SchemaComponent::new(&installation("develop"));
        assert_eq!(
            schema.schema_version(&ctx).await.unwrap(),
            shipyard_core::LATEST_SCHEMA_VERSION
        );
    }

    #[tokio::test]
    async fn test_installing_until_established() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let installation = installation("v1.5.0");
        let schema = SchemaComponent::new(&installation);

        cluster.hold_crds(true);
        schema.install(&ctx, &installation).await.unwrap();
        assert!(schema.installing(&ctx).await.unwrap());

        cluster.hold_crds(false);
        assert!(!schema.installing(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_crd() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let installation = installation("v1.5.0");
        cluster.insert(
            Resource::from_value(json!({
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": "tenants.shipyard.dev"},
            }))
            .unwrap(),
        );
        let schema = SchemaComponent::new(&installation);

        assert!(schema.installed(&ctx).await.unwrap().is_foreign());
        let err = schema.uninstall(&ctx, &installation).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Foreign);
        assert_eq!(cluster.operation_counts().deleted, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_version_is_fatal() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let installation = installation("v0.5.0");
        let err = SchemaComponent::new(&installation)
            .installed(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_uninstall_removes_owned_crds() {
        let cluster = MockCluster::new();
        let ctx = context(&cluster);
        let installation = installation("v1.5.0");
        let schema = SchemaComponent::new(&installation);

        schema.install(&ctx, &installation).await.unwrap();
        schema.uninstall(&ctx, &installation).await.unwrap();
        assert_eq!(cluster.operation_counts().deleted, 2);
        assert_eq!(schema.installed(&ctx).await.unwrap(), InstallCheck::Absent);
    }
}
