//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - operator config or installation manifest is invalid
pub const CONFIG_ERROR: i32 = 2;

/// Render error - a manifest source failed to render
pub const RENDER_ERROR: i32 = 3;

/// Version error - the matrix has no schema for the target version
pub const VERSION_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
