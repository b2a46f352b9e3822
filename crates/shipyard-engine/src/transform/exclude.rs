use shipyard_core::Resource;

use super::{Filter, FilterStage};

/// API group owned by cert-manager
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Drops resources of an API group and its subgroups
#[derive(Debug, Clone)]
pub struct ExcludeGroupFilter {
    group: String,
}

impl ExcludeGroupFilter {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
        }
    }

    /// Drop cert-manager resources, used when cert-manager is disabled
    pub fn skip_cert_manager() -> Self {
        Self::new(CERT_MANAGER_GROUP)
    }

    fn matches(&self, group: &str) -> bool {
        group == self.group
            || group
                .strip_suffix(self.group.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl Filter for ExcludeGroupFilter {
    fn name(&self) -> &'static str {
        "exclude-group"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::Exclude
    }

    fn apply(&self, resources: Vec<Resource>) -> Vec<Resource> {
        resources
            .into_iter()
            .filter(|r| !self.matches(r.group()))
            .collect()
    }
}
