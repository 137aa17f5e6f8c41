//! The committed set of installed docsets
//!
//! A `Catalog` is never mutated in place. Writers clone the map, change the
//! clone and store it as a new snapshot, so a reader that loaded a snapshot
//! keeps seeing exactly the docsets it started with.

use crate::docset::{Docset, DocsetMetadata};
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to the current catalog snapshot
pub type SharedCatalog = Arc<ArcSwap<Catalog>>;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    docsets: BTreeMap<String, Arc<Docset>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedCatalog {
        Arc::new(ArcSwap::from_pointee(self))
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<Docset>> {
        self.docsets.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.docsets.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.docsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docsets.is_empty()
    }

    /// Docsets in identifier order
    pub fn docsets(&self) -> impl Iterator<Item = &Arc<Docset>> {
        self.docsets.values()
    }

    /// Metadata of every docset, sorted by display name
    pub fn metadata(&self) -> Vec<DocsetMetadata> {
        let mut all: Vec<DocsetMetadata> =
            self.docsets.values().map(|d| d.metadata().clone()).collect();
        all.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        all
    }

    /// A copy of this catalog with `docset` added or replaced
    pub fn with(&self, docset: Arc<Docset>) -> Self {
        let mut docsets = self.docsets.clone();
        docsets.insert(docset.identifier().to_string(), docset);
        Self { docsets }
    }

    /// A copy of this catalog without `identifier`
    pub fn without(&self, identifier: &str) -> Self {
        let mut docsets = self.docsets.clone();
        docsets.remove(identifier);
        Self { docsets }
    }
}

impl FromIterator<Docset> for Catalog {
    fn from_iter<T: IntoIterator<Item = Docset>>(iter: T) -> Self {
        Self {
            docsets: iter
                .into_iter()
                .map(|d| (d.identifier().to_string(), Arc::new(d)))
                .collect(),
        }
    }
}
