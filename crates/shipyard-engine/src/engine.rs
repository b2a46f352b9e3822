//! Template engine based on MiniJinja

use minijinja::Environment;
use serde::Serialize;
use shipyard_core::Values;

use crate::error::{EngineError, Result};
use crate::filters;

/// Identity of the installation a manifest is rendered for
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallationInfo {
    /// Name of the `ClusterInstallation` object
    pub name: String,
    /// Namespace platform components are installed into
    pub namespace: String,
    /// Target platform version
    pub version: String,
}

/// Everything a manifest template can reference
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderContext {
    pub values: Values,
    pub installation: InstallationInfo,
}

impl RenderContext {
    pub fn new(values: Values, installation: InstallationInfo) -> Self {
        Self {
            values,
            installation,
        }
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict_mode: self.strict_mode,
        }
    }
}

/// The template engine
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &RenderContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| EngineError::template(template_name, e))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| EngineError::template(template_name, e))?;

        let ctx = minijinja::context! {
            values => &context.values,
            installation => &context.installation,
        };

        tmpl.render(ctx)
            .map_err(|e| EngineError::template(template_name, e))
    }
}
