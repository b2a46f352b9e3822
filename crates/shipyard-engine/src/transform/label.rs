use shipyard_core::Resource;
use std::collections::BTreeMap;

use super::{Filter, FilterStage};

/// Merges a fixed label set into every resource
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    labels: BTreeMap<String, String>,
}

impl LabelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl Filter for LabelFilter {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::Labels
    }

    fn apply(&self, mut resources: Vec<Resource>) -> Vec<Resource> {
        for resource in &mut resources {
            for (key, value) in &self.labels {
                resource.set_label(key, value);
            }
        }
        resources
    }
}
