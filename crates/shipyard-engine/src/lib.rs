//! Shipyard Engine - Manifest rendering and transformation
//!
//! This crate turns manifest sources into resource bundles ready to apply:
//! - `Engine`: MiniJinja templating with a small set of Kubernetes filters
//! - `ManifestSource`: Named template bundles on disk or in memory
//! - `transform::Pipeline`: Ordered, pure filters over resource lists

pub mod engine;
pub mod error;
pub mod filters;
pub mod source;
pub mod transform;

pub use engine::{Engine, EngineBuilder, InstallationInfo, RenderContext};
pub use error::{EngineError, Result};
pub use source::{DirectorySource, ManifestSource, StaticSource};
pub use transform::{Filter, FilterStage, Pipeline};
