//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use shipyard_kube::{ErrorKind, KubeError};
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Operator configuration or installation manifest is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(shipyard::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A manifest source failed to render
    #[error("Render error: {message}")]
    #[diagnostic(code(shipyard::cli::render))]
    Render {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Schema version could not be resolved
    #[error("Version error: {message}")]
    #[diagnostic(code(shipyard::cli::version))]
    Version { message: String },

    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(shipyard::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(shipyard::cli::io))]
    Io { message: String },

    /// Cluster or runtime failure
    #[error("{message}")]
    #[diagnostic(code(shipyard::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Version { .. } => exit_codes::VERSION_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
            help: None,
        }
    }

    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match &err {
            KubeError::VersionMatrix(_) => CliError::Version {
                message: err.to_string(),
            },
            KubeError::Template(_) => CliError::render(err.to_string()),
            KubeError::Io(_) => CliError::Io {
                message: err.to_string(),
            },
            _ if err.kind() == ErrorKind::Fatal => CliError::config(err.to_string()),
            _ => CliError::Other {
                message: err.to_string(),
            },
        }
    }
}

impl From<shipyard_engine::EngineError> for CliError {
    fn from(err: shipyard_engine::EngineError) -> Self {
        CliError::render(err.to_string())
    }
}

impl From<shipyard_core::CoreError> for CliError {
    fn from(err: shipyard_core::CoreError) -> Self {
        CliError::Version {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_kind() {
        let err: CliError = KubeError::VersionMatrix("no entry".into()).into();
        assert_eq!(err.exit_code(), exit_codes::VERSION_ERROR);

        let err: CliError = KubeError::InvalidConfig("bad".into()).into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);

        let err: CliError = KubeError::Timeout("api".into()).into();
        assert_eq!(err.exit_code(), exit_codes::ERROR);
    }
}
