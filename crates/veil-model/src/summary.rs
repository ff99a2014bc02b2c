//! Per-file and per-run accounting.
//!
//! Lookup misses and parse failures never abort a row; they are counted here
//! so silent data loss stays auditable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How temporal shifting was resolved for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftStatus {
    /// The anchor column (or an alias member) was present in the file.
    Direct,
    /// The anchor id was attached via a cross-file join index.
    Joined,
    /// No anchor could be resolved; datetime columns passed through unshifted.
    Skipped,
    /// The file declares no datetime columns.
    NotRequested,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Lookup misses per column (frozen-map misses and missing declared columns).
    pub lookup_misses: BTreeMap<String, u64>,
    /// Unparsable datetime values per column.
    pub parse_failures: BTreeMap<String, u64>,
    pub shift: ShiftStatus,
}

impl FileSummary {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            rows_in: 0,
            rows_out: 0,
            lookup_misses: BTreeMap::new(),
            parse_failures: BTreeMap::new(),
            shift: ShiftStatus::NotRequested,
        }
    }

    pub fn record_lookup_miss(&mut self, column: &str) {
        *self.lookup_misses.entry(column.to_string()).or_default() += 1;
    }

    pub fn record_parse_failure(&mut self, column: &str) {
        *self.parse_failures.entry(column.to_string()).or_default() += 1;
    }

    pub fn total_lookup_misses(&self) -> u64 {
        self.lookup_misses.values().sum()
    }

    pub fn total_parse_failures(&self) -> u64 {
        self.parse_failures.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
}

impl RunSummary {
    pub fn push(&mut self, file: FileSummary) {
        self.files.push(file);
    }

    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows_out).sum()
    }

    pub fn total_lookup_misses(&self) -> u64 {
        self.files.iter().map(FileSummary::total_lookup_misses).sum()
    }

    pub fn total_parse_failures(&self) -> u64 {
        self.files
            .iter()
            .map(FileSummary::total_parse_failures)
            .sum()
    }
}
