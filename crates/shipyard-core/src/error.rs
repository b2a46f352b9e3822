//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("Invalid resource in document {index}: {message}")]
    InvalidResource { index: usize, message: String },

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },

    #[error("Version matrix is empty")]
    EmptyMatrix,

    #[error("No schema version is compatible with platform version {target} (oldest supported: {oldest})")]
    NoCompatibleVersion { target: String, oldest: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
