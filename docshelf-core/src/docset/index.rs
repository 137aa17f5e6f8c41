//! In-memory symbol index of one docset

use super::fuzzy;
use super::symbol::{RawSymbol, SymbolCategory, SymbolEntry};
use crate::error::{DocsetError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Immutable symbol index
///
/// Entries are kept sorted by name, then category, then the order in which
/// they appeared in the symbol table, so exact and prefix lookups are
/// contiguous slices.
#[derive(Debug, Clone, Default)]
pub struct DocsetIndex {
    entries: Vec<SymbolEntry>,
    counts: BTreeMap<SymbolCategory, usize>,
    skipped: usize,
}

impl DocsetIndex {
    /// Build an index from entries in first-seen order
    ///
    /// Repeated (name, category, location) triples are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = SymbolEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut entries: Vec<SymbolEntry> = entries
            .into_iter()
            .filter(|e| seen.insert((e.name.clone(), e.category, e.location.clone())))
            .collect();

        // Stable sort keeps first-seen order within (name, category)
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.category.cmp(&b.category)));

        let mut counts = BTreeMap::new();
        for entry in &entries {
            *counts.entry(entry.category).or_insert(0) += 1;
        }

        Self {
            entries,
            counts,
            skipped: 0,
        }
    }

    /// Parse the JSON symbol table of a bundle
    pub fn from_json(target: &str, text: &str) -> Result<Self> {
        let raw: Vec<RawSymbol> = serde_json::from_str(text)
            .map_err(|e| DocsetError::corrupt(target, format!("invalid symbol table: {e}")))?;
        Ok(Self::from_raw(target, raw))
    }

    /// Index raw symbol records, skipping unnamed and unknown-type ones
    pub(crate) fn from_raw(target: &str, raw: Vec<RawSymbol>) -> Self {
        let total = raw.len();
        let mut skipped = 0;
        let entries: Vec<SymbolEntry> = raw
            .into_iter()
            .filter_map(|symbol| match SymbolCategory::parse(&symbol.kind) {
                Some(category) if !symbol.name.is_empty() => {
                    let location = symbol.location();
                    Some(SymbolEntry::new(symbol.name, category, location))
                }
                Some(_) => {
                    skipped += 1;
                    None
                }
                None => {
                    warn!(docset = target, symbol = %symbol.name, kind = %symbol.kind, "Skipping symbol with unknown type");
                    skipped += 1;
                    None
                }
            })
            .collect();

        let mut index = Self::from_entries(entries);
        index.skipped = skipped;
        debug!(
            docset = target,
            total,
            indexed = index.len(),
            skipped,
            "Built symbol index"
        );
        index
    }

    /// Read and parse `symbols.json` from a file
    pub fn from_file(target: &str, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DocsetError::corrupt(
                target,
                format!("cannot read symbol table {}: {e}", path.display()),
            )
        })?;
        Self::from_json(target, &text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of symbol table records that were not indexed
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Entries named exactly `name` (case-sensitive), by category then first-seen
    pub fn lookup_exact(&self, name: &str) -> &[SymbolEntry] {
        let start = self.entries.partition_point(|e| e.name.as_str() < name);
        let len = self.entries[start..].partition_point(|e| e.name == name);
        &self.entries[start..start + len]
    }

    /// Entries whose name starts with `prefix` (case-sensitive), lexicographically
    pub fn lookup_prefix(&self, prefix: &str) -> &[SymbolEntry] {
        let start = self.entries.partition_point(|e| e.name.as_str() < prefix);
        let len = self.entries[start..].partition_point(|e| e.name.starts_with(prefix));
        &self.entries[start..start + len]
    }

    /// Case-insensitive subsequence matches, best score first
    pub fn lookup_fuzzy(&self, query: &str) -> Vec<(&SymbolEntry, f64)> {
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(&SymbolEntry, f64)> = self
            .entries
            .iter()
            .filter_map(|e| fuzzy::score(query, &e.name).map(|score| (e, score)))
            .collect();

        hits.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.category.as_str().cmp(b.category.as_str()))
        });
        hits
    }

    /// Number of indexed symbols per category
    pub fn symbol_counts(&self) -> &BTreeMap<SymbolCategory, usize> {
        &self.counts
    }

    pub fn entries_in(&self, category: SymbolCategory) -> impl Iterator<Item = &SymbolEntry> + '_ {
        self.entries.iter().filter(move |e| e.category == category)
    }
}
