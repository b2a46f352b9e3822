//! Engine error types

use thiserror::Error;

/// Result type for shipyard-engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("manifest source '{name}' not found")]
    SourceNotFound { name: String },

    #[error("template error in {template}: {message}")]
    Template { template: String, message: String },

    #[error("invalid manifest in {template}: {source}")]
    InvalidManifest {
        template: String,
        #[source]
        source: shipyard_core::CoreError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn template(template: &str, err: minijinja::Error) -> Self {
        // minijinja's alternate format carries the source excerpt
        Self::Template {
            template: template.to_string(),
            message: format!("{:#}", err),
        }
    }
}
