//! Raw-manifest components
//!
//! The bundle is rendered from a named manifest source, transformed for
//! this installation, and applied with Server-Side Apply. Presence is
//! computed by rendering the bundle again and counting the resources the
//! cluster does not have.

use async_trait::async_trait;
use kube::ResourceExt;
use rand::Rng;
use rand::distr::Alphanumeric;
use shipyard_core::{ManifestBundle, Values};
use shipyard_engine::transform::{
    CACHE_SECRET, ExcludeGroupFilter, ImageVersionFilter, JWT_SECRET, LabelFilter,
    NamespaceFilter, OBJECT_STORE_SECRET, OwnerReference, OwnerReferenceFilter, SecretValueFilter,
};
use shipyard_engine::{InstallationInfo, ManifestSource, Pipeline, RenderContext};

use super::chart::SpecSelector;
use super::{Component, Context, InstallCheck};
use crate::cluster::ClusterOps;
use crate::config::OperatorConfig;
use crate::error::{KubeError, Result};
use crate::installation::{ClusterInstallation, InstallPhase};
use crate::ownership::{self, Ownership, Target, ownership_labels};

/// CRD whose presence means cert-manager resources can be applied
pub const CERT_MANAGER_CRD: &str = "certificates.cert-manager.io";

/// Length of a generated token signing key
const JWT_LENGTH: usize = 48;

/// Values the transform pipeline needs beyond the component itself
///
/// Gathered from the cluster before an install; the pipeline built from
/// them is pure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineInputs {
    pub jwt_secret: Option<String>,
    /// (access key, secret key)
    pub object_store: Option<(String, String)>,
    pub cache_password: Option<String>,
    pub cert_manager_present: bool,
    pub owner_reference: Option<OwnerReference>,
}

impl PipelineInputs {
    /// Read secret material and prerequisites from the cluster
    ///
    /// The token signing key comes from the spec, else the live secret,
    /// else it is generated, so repeated passes never rotate it.
    pub async fn gather(
        cluster: &dyn ClusterOps,
        installation: &ClusterInstallation,
        with_secrets: bool,
    ) -> Result<Self> {
        let namespace = installation.target_namespace();
        let cert_manager_present = cluster.crd_exists(CERT_MANAGER_CRD).await?;

        let mut inputs = Self {
            cert_manager_present,
            owner_reference: owner_reference(installation),
            ..Default::default()
        };
        if !with_secrets {
            return Ok(inputs);
        }

        inputs.jwt_secret = match &installation.spec.core.jwt_secret {
            Some(secret) => Some(secret.clone()),
            None => match cluster.secret_value(&namespace, JWT_SECRET, "secret").await? {
                Some(existing) => Some(existing),
                None => {
                    tracing::info!(namespace = %namespace, "generating token signing key");
                    Some(generate_secret(JWT_LENGTH))
                }
            },
        };

        let access = cluster.secret_value(&namespace, "minio", "root-user").await?;
        let secret = cluster.secret_value(&namespace, "minio", "root-password").await?;
        inputs.object_store = access.zip(secret);

        inputs.cache_password = cluster
            .secret_value(&namespace, "redis", "redis-password")
            .await?;
        Ok(inputs)
    }

    /// Stand-in values for rendering without a cluster
    pub fn placeholders(installation: &ClusterInstallation) -> Self {
        Self {
            jwt_secret: Some(
                installation
                    .spec
                    .core
                    .jwt_secret
                    .clone()
                    .unwrap_or_else(|| "<generated>".to_string()),
            ),
            object_store: Some(("<minio-root-user>".to_string(), "<minio-root-password>".to_string())),
            cache_password: Some("<redis-password>".to_string()),
            cert_manager_present: installation.spec.cert_manager.enabled,
            owner_reference: owner_reference(installation),
        }
    }
}

/// Owner reference to the installation object, once it has a uid
fn owner_reference(installation: &ClusterInstallation) -> Option<OwnerReference> {
    installation.uid().map(|uid| OwnerReference {
        api_version: <ClusterInstallation as kube::Resource>::api_version(&()).to_string(),
        kind: <ClusterInstallation as kube::Resource>::kind(&()).to_string(),
        name: installation.name_any(),
        uid,
        controller: true,
        block_owner_deletion: true,
    })
}

fn generate_secret(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A sub-system installed from raw manifests
pub struct ManifestComponent {
    name: &'static str,
    phase: InstallPhase,
    source: String,
    namespace: String,
    /// Namespace of the installation object itself
    owner_namespace: String,
    target: Target,
    ready_prefix: String,
    select: SpecSelector,
    values: Values,
    owner: String,
    installation_name: String,
    version: String,
    injects_secrets: bool,
}

impl ManifestComponent {
    /// Create a component for an installation; the target is a Deployment
    pub fn new(
        name: &'static str,
        phase: InstallPhase,
        source: &str,
        deployment: &str,
        installation: &ClusterInstallation,
        select: SpecSelector,
    ) -> Self {
        let namespace = installation.target_namespace();
        Self {
            name,
            phase,
            source: source.to_string(),
            target: Target::deployment(&namespace, deployment),
            ready_prefix: deployment.to_string(),
            owner_namespace: installation.namespace().unwrap_or_else(|| namespace.clone()),
            namespace,
            select,
            values: select(&installation.spec).values(),
            owner: installation.owner_id(),
            installation_name: installation.name_any(),
            version: installation.spec.version.clone(),
            injects_secrets: false,
        }
    }

    /// Fill the platform's secrets from [`PipelineInputs`]
    pub fn with_secrets(mut self) -> Self {
        self.injects_secrets = true;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn injects_secrets(&self) -> bool {
        self.injects_secrets
    }

    fn render(&self, source: &dyn ManifestSource) -> Result<ManifestBundle> {
        let context = RenderContext::new(
            self.values.clone(),
            InstallationInfo {
                name: self.installation_name.clone(),
                namespace: self.namespace.clone(),
                version: self.version.clone(),
            },
        );
        Ok(source.load(&self.source, &context)?)
    }

    /// Filters that decide resource identity
    fn identity_pipeline(&self, cert_manager_present: bool) -> Pipeline {
        let mut pipeline = Pipeline::new().with(NamespaceFilter::new(self.namespace.as_str()));
        if !cert_manager_present {
            pipeline.push(ExcludeGroupFilter::skip_cert_manager());
        }
        pipeline
    }

    /// The full pipeline applied before install
    pub fn pipeline(&self, config: &OperatorConfig, inputs: &PipelineInputs) -> Pipeline {
        let mut pipeline = self.identity_pipeline(inputs.cert_manager_present);
        pipeline.push(LabelFilter::from_labels(ownership_labels(&self.owner)));
        pipeline.push(
            ImageVersionFilter::new(self.version.as_str(), config.image_repository_prefix.as_str())
                .skipping(config.deprecated_images.iter().cloned()),
        );

        if self.injects_secrets {
            if let Some(jwt) = &inputs.jwt_secret {
                pipeline.push(SecretValueFilter::jwt(jwt.as_str()));
            }
            if let Some((access, secret)) = &inputs.object_store {
                pipeline.push(SecretValueFilter::object_store(access.as_str(), secret.as_str()));
            }
            if let Some(password) = &inputs.cache_password {
                pipeline.push(SecretValueFilter::cache(password.as_str()));
            }
        }

        if let Some(owner) = &inputs.owner_reference {
            pipeline.push(OwnerReferenceFilter::new(
                self.owner_namespace.as_str(),
                owner.clone(),
            ));
        }
        pipeline
    }

    /// Render and transform the bundle without touching the cluster
    pub fn build(
        &self,
        source: &dyn ManifestSource,
        config: &OperatorConfig,
        inputs: &PipelineInputs,
    ) -> Result<ManifestBundle> {
        let pipeline = self.pipeline(config, inputs);
        tracing::debug!(component = %self.name, filters = ?pipeline.names(), "building bundle");
        Ok(pipeline.run(self.render(source)?))
    }

    /// Resources an install would produce, for identity checks
    async fn expected(&self, ctx: &Context) -> Result<ManifestBundle> {
        let cert_manager_present = ctx.cluster.crd_exists(CERT_MANAGER_CRD).await?;
        Ok(self
            .identity_pipeline(cert_manager_present)
            .run(self.render(ctx.manifests.as_ref())?))
    }

    /// Drop resources that already exist without our ownership label
    async fn without_foreign(
        &self,
        cluster: &dyn ClusterOps,
        bundle: ManifestBundle,
    ) -> Result<ManifestBundle> {
        let mut kept = ManifestBundle::default();
        for resource in bundle {
            if let Some(live) = cluster.metadata(&resource).await? {
                if ownership::classify(&live.labels, &self.owner) == Ownership::Foreign {
                    tracing::warn!(
                        component = %self.name,
                        resource = %resource.key(),
                        "not created by shipyard, leaving it untouched"
                    );
                    continue;
                }
            }
            kept.push(resource);
        }
        Ok(kept)
    }

    fn refusal(&self) -> KubeError {
        KubeError::NotInstalledByOperator {
            component: self.name.to_string(),
            target: self.target.to_string(),
        }
    }
}

#[async_trait]
impl Component for ManifestComponent {
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
        let cluster = ctx.cluster.as_ref();
        if ownership::check(cluster, &self.target, &self.owner)
            .await?
            .is_foreign()
        {
            return Ok(InstallCheck::Foreign {
                target: self.target.to_string(),
            });
        }

        let expected = self.expected(ctx).await?;
        let mut missing = 0;
        for resource in &expected {
            if !cluster.exists(resource).await? {
                missing += 1;
            }
        }

        let check = match missing {
            0 => InstallCheck::Installed,
            n if n == expected.len() => InstallCheck::Absent,
            n => InstallCheck::Partial {
                missing: n,
                expected: expected.len(),
            },
        };
        if let InstallCheck::Partial { missing, expected } = &check {
            tracing::warn!(component = %self.name, missing, expected, "resources missing, will re-apply");
        }
        Ok(check)
    }

    async fn install(&self, ctx: &Context, installation: &ClusterInstallation) -> Result<()> {
        let cluster = ctx.cluster.as_ref();
        let inputs = PipelineInputs::gather(cluster, installation, self.injects_secrets).await?;

        if cluster
            .create_namespace(&self.namespace, &ownership_labels(&self.owner))
            .await?
        {
            tracing::info!(component = %self.name, namespace = %self.namespace, "created namespace");
        }

        let bundle = self.build(ctx.manifests.as_ref(), &ctx.config, &inputs)?;
        let bundle = self.without_foreign(cluster, bundle).await?;
        let summary = cluster.apply(&bundle).await?.into_result(self.name)?;

        tracing::info!(
            component = %self.name,
            namespace = %self.namespace,
            summary = %summary.summary(),
            "applied manifests"
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
        if ownership::check(cluster, &self.target, &self.owner)
            .await?
            .is_foreign()
        {
            return Err(self.refusal());
        }

        // namespaces and CRDs are shared with other components
        let mut owned = ManifestBundle::default();
        for resource in self.expected(ctx).await? {
            if matches!(resource.kind(), "Namespace" | "CustomResourceDefinition") {
                continue;
            }
            let Some(live) = cluster.metadata(&resource).await? else {
                continue;
            };
            match ownership::classify(&live.labels, &self.owner) {
                Ownership::Ours => owned.push(resource),
                _ => tracing::warn!(
                    component = %self.name,
                    resource = %resource.key(),
                    "not created by shipyard, leaving it in place"
                ),
            }
        }

        let summary = cluster.delete(&owned).await?;
        tracing::info!(component = %self.name, summary = %summary.summary(), "deleted manifests");
        Ok(())
    }
}
