//! Aggregate highlight results
//!
//! File path → sorted line indices. The per-file match count is derived from
//! the entry, so the two views can never disagree.

use dashmap::DashMap;
use std::collections::BTreeMap;

/// Concurrent file → attributed-lines map.
///
/// Workers of one pass write disjoint keys, so writes never contend on the
/// same entry.
#[derive(Debug, Default)]
pub struct HighlightDataStore {
    lines: DashMap<String, Vec<usize>>,
}

impl HighlightDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `file`. Lines are stored sorted and deduplicated.
    ///
    /// An empty `lines` keeps an (empty) entry: the file was checked and
    /// nothing matched.
    pub fn update(&self, file: &str, mut lines: Vec<usize>) {
        lines.sort_unstable();
        lines.dedup();
        self.lines.insert(file.to_string(), lines);
    }

    /// Drop the entry for `file`. Returns whether one existed.
    pub fn remove(&self, file: &str) -> bool {
        self.lines.remove(file).is_some()
    }

    /// Number of attributed lines in `file` (0 when absent)
    pub fn count(&self, file: &str) -> usize {
        self.lines.get(file).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Attributed lines of `file`, if it has an entry
    pub fn lines(&self, file: &str) -> Option<Vec<usize>> {
        self.lines.get(file).map(|entry| entry.clone())
    }

    pub fn clear(&self) {
        self.lines.clear();
    }

    /// Whether `file` has an entry (checked during a pass)
    pub fn is_watched(&self, file: &str) -> bool {
        self.lines.contains_key(file)
    }

    /// Snapshot of every entry, including empty ones
    pub fn highlight_data(&self) -> BTreeMap<String, Vec<usize>> {
        self.lines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Files with at least one attributed line, with their counts
    pub fn highlight_files(&self) -> BTreeMap<String, usize> {
        self.lines
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Attributed lines across all files
    pub fn total_lines(&self) -> usize {
        self.lines.iter().map(|entry| entry.value().len()).sum()
    }
}
