//! Shipyard Core - Core types shared by the Shipyard installer
//!
//! This crate provides the foundational types used throughout Shipyard:
//! - `Values`: Component configuration trees with deep merge support
//! - `Resource` / `ManifestBundle`: Structured resource documents in apply order
//! - `VersionMatrix`: Platform version to CRD schema version resolution

pub mod error;
pub mod resource;
pub mod values;
pub mod version;

pub use error::{CoreError, Result};
pub use resource::{ManifestBundle, Resource, ResourceKey};
pub use values::Values;
pub use version::{
    DEVELOP_VERSION, LATEST_SCHEMA_VERSION, VersionMatrix, compare_api_versions, is_develop,
    parse_platform_version,
};
