//! Manifest sources
//!
//! A source turns a name (`core`, `workspaces`, `crds/v1alpha2`) into a
//! rendered [`ManifestBundle`]. Each template file may hold several YAML
//! documents; files are rendered in lexical order so bundles are stable
//! across passes.

use indexmap::IndexMap;
use shipyard_core::ManifestBundle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::engine::{Engine, RenderContext};
use crate::error::{EngineError, Result};

/// Produces rendered resource bundles by name
pub trait ManifestSource: Send + Sync {
    /// Render the named bundle
    fn load(&self, name: &str, context: &RenderContext) -> Result<ManifestBundle>;

    /// Whether the named bundle exists
    fn contains(&self, name: &str) -> bool;
}

/// Parse rendered files into one bundle, preserving file order
fn bundle_from_rendered(rendered: IndexMap<String, String>) -> Result<ManifestBundle> {
    let mut bundle = ManifestBundle::default();
    for (template, content) in rendered {
        let part = ManifestBundle::from_yaml(&content)
            .map_err(|source| EngineError::InvalidManifest { template, source })?;
        bundle.extend(part);
    }
    Ok(bundle)
}

/// Templates read from `<root>/<name>/**/*.yaml`
///
/// Files whose name starts with `_` are skipped.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    engine: Engine,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engine: Engine::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn template_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                let is_yaml = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                );
                let is_helper = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('_'));
                is_yaml && !is_helper
            })
            .collect();
        files.sort();
        files
    }

    /// Render every template of a source, keyed by path relative to the source
    pub fn render_files(
        &self,
        name: &str,
        context: &RenderContext,
    ) -> Result<IndexMap<String, String>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(EngineError::SourceNotFound {
                name: name.to_string(),
            });
        }

        let mut rendered = IndexMap::new();
        for path in self.template_files(&dir) {
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let content = std::fs::read_to_string(&path)?;
            let output = self.engine.render_string(&content, context, &rel)?;
            rendered.insert(rel, output);
        }

        tracing::debug!(source = name, files = rendered.len(), "rendered manifest source");
        Ok(rendered)
    }
}

impl ManifestSource for DirectorySource {
    fn load(&self, name: &str, context: &RenderContext) -> Result<ManifestBundle> {
        bundle_from_rendered(self.render_files(name, context)?)
    }

    fn contains(&self, name: &str) -> bool {
        self.root.join(name).is_dir()
    }
}

/// In-memory templates, one YAML stream per name
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    templates: HashMap<String, String>,
    engine: Engine,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template stream under a name
    pub fn with(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(name.into(), template.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }
}

impl ManifestSource for StaticSource {
    fn load(&self, name: &str, context: &RenderContext) -> Result<ManifestBundle> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| EngineError::SourceNotFound {
                name: name.to_string(),
            })?;
        let output = self.engine.render_string(template, context, name)?;

        let mut rendered = IndexMap::new();
        rendered.insert(name.to_string(), output);
        bundle_from_rendered(rendered)
    }

    fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InstallationInfo;
    use serde_json::json;
    use shipyard_core::Values;

    fn context() -> RenderContext {
        RenderContext::new(
            Values(json!({"replicas": 3})),
            InstallationInfo {
                name: "main".to_string(),
                namespace: "platform".to_string(),
                version: "v1.5.0".to_string(),
            },
        )
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_directory_source_renders_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "core/20-deployment.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: api\nspec:\n  replicas: {{ values.replicas }}\n",
        );
        write(
            dir.path(),
            "core/10-config.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n",
        );
        write(dir.path(), "core/_helpers.yaml", "not: [valid");
        write(dir.path(), "core/README.md", "ignored");

        let source = DirectorySource::new(dir.path());
        let bundle = source.load("core", &context()).unwrap();

        let names: Vec<&str> = bundle.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["a", "b", "api"]);
        assert_eq!(
            bundle.find("Deployment", "api").unwrap().body()["spec"]["replicas"],
            json!(3)
        );
    }

    #[test]
    fn test_directory_source_nested_names() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "crds/v1alpha2/workspaces.yaml",
            "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: workspaces.shipyard.dev\n",
        );

        let source = DirectorySource::new(dir.path());
        assert!(source.contains("crds/v1alpha2"));
        assert!(!source.contains("crds/v1alpha1"));
        assert_eq!(source.load("crds/v1alpha2", &context()).unwrap().len(), 1);
    }

    #[test]
    fn test_directory_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        let err = source.load("core", &context()).unwrap_err();
        assert!(matches!(err, EngineError::SourceNotFound { .. }));
    }

    #[test]
    fn test_directory_source_reports_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "core/bad.yaml", "apiVersion: v1\nkind: ConfigMap\n");
        let source = DirectorySource::new(dir.path());
        let err = source.load("core", &context()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidManifest { .. }));
    }

    #[test]
    fn test_static_source() {
        let source = StaticSource::new().with(
            "workspaces",
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: ws\n  namespace: {{ installation.namespace }}\n",
        );
        let bundle = source.load("workspaces", &context()).unwrap();
        assert_eq!(bundle.resources()[0].namespace(), Some("platform"));
        assert!(source.load("core", &context()).is_err());
    }
}
