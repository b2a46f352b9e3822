//! CLI commands

pub mod controller;
pub mod crd;
pub mod render;
pub mod resolve_version;
