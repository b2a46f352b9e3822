//! Error types for shipyard-kube

use thiserror::Error;

/// Result type for shipyard-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Coarse classification of a [`KubeError`]
///
/// Callers branch on the kind, never on error identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target exists but belongs to someone else; leave it alone
    Foreign,
    /// Some but not all expected resources are present
    Drift,
    /// Network or API failure; retry on the next pass
    Transient,
    /// Configuration problem; retrying will not help
    Fatal,
}

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Target exists but was not created by this operator
    #[error("{component}: {target} exists but was not installed by shipyard")]
    NotInstalledByOperator { component: String, target: String },

    /// Partial install detected
    #[error("{component}: {missing} of {expected} resources are missing")]
    MissingResources {
        component: String,
        missing: usize,
        expected: usize,
    },

    /// Chart could not be located
    #[error("chart '{chart}' not found: {message}")]
    ChartNotFound { chart: String, message: String },

    /// Chart exists but cannot be installed (library chart)
    #[error("chart '{chart}' is not installable (type '{chart_type}')")]
    ChartNotInstallable { chart: String, chart_type: String },

    /// Package manager invocation failed
    #[error("helm {action} failed for release '{release}': {message}")]
    Helm {
        action: String,
        release: String,
        message: String,
    },

    /// Version matrix could not be fetched or resolved
    #[error("version matrix error: {0}")]
    VersionMatrix(String),

    /// One or more resources failed to apply
    #[error("{component}: failed to apply resources ({summary}): {first_error}")]
    ApplyFailed {
        component: String,
        summary: String,
        first_error: String,
    },

    /// Manifest rendering failed
    #[error("template error: {0}")]
    Template(#[from] shipyard_engine::EngineError),

    /// Core type error (values, resources, versions)
    #[error(transparent)]
    Core(#[from] shipyard_core::CoreError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout
    #[error("operation timed out after {0}")]
    Timeout(String),

    /// Wait was cancelled before completing
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// HTTP error talking to an auxiliary service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KubeError::NotInstalledByOperator { .. } => ErrorKind::Foreign,
            KubeError::MissingResources { .. } => ErrorKind::Drift,
            KubeError::ChartNotFound { .. }
            | KubeError::ChartNotInstallable { .. }
            | KubeError::VersionMatrix(_)
            | KubeError::Template(_)
            | KubeError::Core(_)
            | KubeError::InvalidConfig(_)
            | KubeError::Serialization(_) => ErrorKind::Fatal,
            KubeError::Api(_)
            | KubeError::Helm { .. }
            | KubeError::ApplyFailed { .. }
            | KubeError::Timeout(_)
            | KubeError::Cancelled(_)
            | KubeError::Http(_)
            | KubeError::Io(_) => ErrorKind::Transient,
        }
    }

    /// Whether retrying later may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
