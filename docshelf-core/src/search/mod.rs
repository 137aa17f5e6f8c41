//! Symbol search across installed docsets
//!
//! Searching is a pure read over one catalog snapshot: the engine loads the
//! current snapshot once per query, so an install or update that commits
//! while a query runs is either fully visible or not visible at all.

pub mod query;

pub use query::SearchQuery;

use crate::catalog::SharedCatalog;
use crate::docset::{Docset, SymbolCategory};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 100;

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub name: String,
    pub category: SymbolCategory,
    pub location: String,
    /// Identifier of the docset the symbol belongs to
    pub docset: String,
    pub docset_name: String,
    pub score: f64,
}

impl SearchResult {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.docset_name.cmp(&other.docset_name))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.category.cmp(&other.category))
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub fuzzy: bool,
    pub limit: usize,
    /// Restrict the search to these identifiers; empty means every docset
    pub docsets: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fuzzy: false,
            limit: DEFAULT_LIMIT,
            docsets: Vec::new(),
        }
    }
}

fn hits_in(docset: &Docset, term: &str, fuzzy: bool, out: &mut Vec<SearchResult>) {
    let index = docset.index();
    let mut push = |entry: &crate::docset::SymbolEntry, score: f64| {
        out.push(SearchResult {
            name: entry.name.clone(),
            category: entry.category,
            location: entry.location.clone(),
            docset: docset.identifier().to_string(),
            docset_name: docset.name().to_string(),
            score,
        });
    };

    if fuzzy {
        for (entry, score) in index.lookup_fuzzy(term) {
            push(entry, score);
        }
    } else {
        for entry in index.lookup_exact(term) {
            push(entry, f64::INFINITY);
        }
        for entry in index.lookup_prefix(term).iter().filter(|e| e.name != term) {
            push(entry, -(entry.name.chars().count() as f64));
        }
    }
}

/// Search `docsets` for `query`
///
/// A `kw:term` query only consults docsets whose identifier or keywords
/// start with one of the keywords. Without `fuzzy`, exact matches rank
/// first and prefix matches follow, shortest name first.
pub fn search<'a>(
    query: &str,
    docsets: impl IntoIterator<Item = &'a Docset>,
    fuzzy: bool,
    limit: usize,
) -> Vec<SearchResult> {
    let query = SearchQuery::parse(query);
    if query.term.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut results = Vec::new();
    for docset in docsets {
        if query.has_keywords()
            && !std::iter::once(docset.identifier())
                .chain(docset.metadata().keywords.iter().map(String::as_str))
                .any(|k| query.matches_keyword(k))
        {
            continue;
        }
        hits_in(docset, &query.term, fuzzy, &mut results);
    }

    results.sort_by(SearchResult::rank);
    results.truncate(limit);
    results
}

/// Search facade bound to a registry's catalog
#[derive(Clone)]
pub struct SearchEngine {
    catalog: SharedCatalog,
}

impl SearchEngine {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self { catalog }
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let snapshot = self.catalog.load_full();
        let active: Vec<&Arc<Docset>> = snapshot
            .docsets()
            .filter(|d| {
                options.docsets.is_empty() || options.docsets.iter().any(|id| id == d.identifier())
            })
            .collect();

        search(
            query,
            active.into_iter().map(|d| d.as_ref()),
            options.fuzzy,
            options.limit,
        )
    }
}
