//! Platform version to schema version resolution
//!
//! The compatibility matrix maps a minimum platform version to the CRD
//! schema version that platform release requires. Resolution treats the
//! matrix as a monotone step function: the schema of the greatest key not
//! exceeding the target wins.

use semver::Version;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Target version used by development builds
pub const DEVELOP_VERSION: &str = "develop";

/// Newest schema version known to this build
pub const LATEST_SCHEMA_VERSION: &str = "v1alpha2";

/// Parse a platform version, accepting an optional `v` prefix and
/// missing minor/patch components (`v1.5` is `1.5.0`)
pub fn parse_platform_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let (core, suffix) = match bare.find(['-', '+']) {
        Some(idx) => bare.split_at(idx),
        None => (bare, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => bare.to_string(),
    };

    Version::parse(&padded).map_err(|e| CoreError::InvalidVersion {
        version: input.to_string(),
        message: e.to_string(),
    })
}

/// Whether the target is the development sentinel
pub fn is_develop(target: &str) -> bool {
    target.trim() == DEVELOP_VERSION
}

/// Compatibility matrix sorted by minimum platform version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMatrix {
    entries: Vec<(Version, String)>,
}

impl VersionMatrix {
    /// Build from a raw `{minPlatformVersion: schemaVersion}` map
    pub fn from_map(raw: &BTreeMap<String, String>) -> Result<Self> {
        let mut entries = raw
            .iter()
            .map(|(key, schema)| Ok((parse_platform_version(key)?, schema.clone())))
            .collect::<Result<Vec<_>>>()?;

        if entries.is_empty() {
            return Err(CoreError::EmptyMatrix);
        }

        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1.clone();
                true
            } else {
                false
            }
        });

        Ok(Self { entries })
    }

    /// Parse a JSON object document
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_map(&raw)
    }

    /// Resolve the schema version for a target platform version
    ///
    /// `develop` always resolves to [`LATEST_SCHEMA_VERSION`].
    pub fn resolve(&self, target: &str) -> Result<String> {
        if is_develop(target) {
            return Ok(LATEST_SCHEMA_VERSION.to_string());
        }

        let target_version = parse_platform_version(target)?;

        // entries are sorted, so the last key <= target is the answer
        self.entries
            .iter()
            .rev()
            .find(|(min, _)| *min <= target_version)
            .map(|(_, schema)| schema.clone())
            .ok_or_else(|| CoreError::NoCompatibleVersion {
                target: target.to_string(),
                oldest: self
                    .entries
                    .first()
                    .map(|(v, _)| v.to_string())
                    .unwrap_or_default(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stability level of a Kubernetes API version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stability {
    Alpha,
    Beta,
    Stable,
}

/// Order Kubernetes API versions (`v1alpha1 < v1beta1 < v1 < v2alpha1`)
///
/// Unparseable versions sort before any valid one and compare lexically
/// among themselves.
pub fn compare_api_versions(a: &str, b: &str) -> Ordering {
    match (parse_api_version(a), parse_api_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn parse_api_version(input: &str) -> Option<(u32, Stability, u32)> {
    let rest = input.strip_prefix('v')?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let major: u32 = rest[..digits_end].parse().ok()?;
    let tail = &rest[digits_end..];

    if tail.is_empty() {
        return Some((major, Stability::Stable, 0));
    }

    let (stability, level) = if let Some(level) = tail.strip_prefix("alpha") {
        (Stability::Alpha, level)
    } else if let Some(level) = tail.strip_prefix("beta") {
        (Stability::Beta, level)
    } else {
        return None;
    };

    Some((major, stability, level.parse().ok()?))
}
