//! Manifest transform pipeline
//!
//! A [`Pipeline`] is an ordered list of [`Filter`]s, each a pure function
//! over the resource list. Filters declare a [`FilterStage`]; the pipeline
//! keeps filters sorted by stage (insertion order within a stage), so the
//! owner-reference filter always sees namespaces after rewriting no matter
//! how the pipeline was assembled.
//!
//! ```text
//!   rendered bundle
//!        │
//!        ▼
//!   Exclude ─► Namespace ─► Labels ─► Image ─► Secret ─► OwnerReference
//!                                                              │
//!                                                              ▼
//!                                                       bundle to apply
//! ```

mod exclude;
mod image;
mod label;
mod namespace;
mod owner;
mod secret;

pub use exclude::{CERT_MANAGER_GROUP, ExcludeGroupFilter};
pub use image::{ImageVersionFilter, split_image};
pub use label::LabelFilter;
pub use namespace::NamespaceFilter;
pub use owner::{OwnerReference, OwnerReferenceFilter};
pub use secret::{CACHE_SECRET, JWT_SECRET, OBJECT_STORE_SECRET, SecretValueFilter};

use shipyard_core::{ManifestBundle, Resource};

/// Position of a filter in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterStage {
    /// Drop resources before anything else touches them
    Exclude,
    /// Rewrite namespaces and cross-namespace references
    Namespace,
    /// Merge labels
    Labels,
    /// Pin container image tags
    Image,
    /// Inject secret material
    Secret,
    /// Attach owner references; depends on final namespaces
    OwnerReference,
}

/// A pure transformation over a resource list
pub trait Filter: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Where the filter runs relative to others
    fn stage(&self) -> FilterStage;

    /// Transform the resources; may drop elements
    fn apply(&self, resources: Vec<Resource>) -> Vec<Resource>;
}

/// Ordered chain of filters
#[derive(Default)]
pub struct Pipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter (builder style)
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.push(filter);
        self
    }

    /// Add a filter, keeping the list ordered by stage
    pub fn push(&mut self, filter: impl Filter + 'static) {
        let stage = filter.stage();
        let position = self.filters.partition_point(|f| f.stage() <= stage);
        self.filters.insert(position, Box::new(filter));
    }

    /// Filter names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter over the bundle
    pub fn run(&self, bundle: ManifestBundle) -> ManifestBundle {
        let mut resources = bundle.into_resources();
        for filter in &self.filters {
            let before = resources.len();
            resources = filter.apply(resources);
            tracing::trace!(
                filter = filter.name(),
                before,
                after = resources.len(),
                "applied filter"
            );
        }
        ManifestBundle::new(resources)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("filters", &self.names())
            .finish()
    }
}
