//! Cross-file join index for attaching the anchor id.
//!
//! When a file lacks the datetime-anchor column, a one-time index is built
//! from another declared file that carries both an overlapping identifier
//! column and the anchor column. For a duplicate key the first encountered
//! mapping wins; later occurrences are ignored rather than silently
//! overwriting.

use std::collections::BTreeMap;

/// Key value -> anchor id, built once per (key column, anchor column) pair.
#[derive(Debug, Clone, Default)]
pub struct JoinIndex {
    entries: BTreeMap<String, String>,
}

impl JoinIndex {
    /// Builds the index from `(key, anchor_id)` pairs. Empty keys and empty
    /// anchor values are skipped; duplicates keep the first mapping.
    pub fn build(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut entries = BTreeMap::new();
        for (key, anchor) in pairs {
            if key.is_empty() || anchor.is_empty() {
                continue;
            }
            entries.entry(key).or_insert(anchor);
        }
        Self { entries }
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
