//! Datetime parsing and per-column format inference.
//!
//! The pipeline samples the first few rows of each declared time column
//! against two fixed patterns. When one pattern carries a strict majority of
//! the sampled non-empty values, that exact format becomes the column's fast
//! path for the rest of the stream; otherwise every value goes through the
//! flexible multi-format parser. Both paths produce identical timestamps for
//! correctly formatted input; the inference only avoids the per-value
//! format search.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Fixed fast-path pattern: date and time.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Fixed fast-path pattern: date only.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Number of leading rows sampled per time column.
pub const SAMPLE_ROWS: usize = 10;

const FLEXIBLE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    DATE_TIME_FORMAT,
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const FLEXIBLE_DATE_FORMATS: &[&str] = &[
    DATE_FORMAT,
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
];

/// Resolved parsing strategy for one time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    /// Strict `%Y-%m-%d %H:%M:%S`.
    DateTime,
    /// Strict `%Y-%m-%d`; parsed values carry a midnight time component.
    DateOnly,
    /// Per-value search over the flexible format list.
    Flexible,
}

impl ColumnFormat {
    /// Parses a raw cell. Returns `None` for unparsable input; the caller
    /// degrades the field to missing and counts a parse failure. A value
    /// that defeats an inferred fixed format is a parse failure too; the
    /// stream never falls back to the flexible parser mid-file.
    pub fn parse(self, raw: &str) -> Option<NaiveDateTime> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match self {
            Self::DateTime => NaiveDateTime::parse_from_str(trimmed, DATE_TIME_FORMAT).ok(),
            Self::DateOnly => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
            Self::Flexible => parse_flexible(trimmed),
        }
    }

    /// Renders a shifted timestamp back into the column's format family.
    pub fn render(self, ts: NaiveDateTime) -> String {
        match self {
            Self::DateTime | Self::Flexible => ts.format(DATE_TIME_FORMAT).to_string(),
            Self::DateOnly => ts.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Multi-format fallback parser.
///
/// Tries datetime shapes first, then date-only shapes (midnight time), then
/// RFC 3339 with an explicit zone (the local clock reading is kept and the
/// zone discarded; offsets are applied in naive local time).
pub fn parse_flexible(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in FLEXIBLE_DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    for format in FLEXIBLE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.naive_local());
    }
    None
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnTally {
    date_time: usize,
    date_only: usize,
    non_empty: usize,
}

/// Tallies fixed-pattern matches over the leading sample window.
#[derive(Debug, Clone)]
pub struct FormatSampler {
    tallies: Vec<ColumnTally>,
    rows_seen: usize,
    sample_rows: usize,
}

impl FormatSampler {
    pub fn new(column_count: usize) -> Self {
        Self {
            tallies: vec![ColumnTally::default(); column_count],
            rows_seen: 0,
            sample_rows: SAMPLE_ROWS,
        }
    }

    /// True while more rows should be fed through [`Self::observe_row`].
    pub fn sampling(&self) -> bool {
        self.rows_seen < self.sample_rows
    }

    /// Feeds one row's raw values, positionally aligned with the column
    /// order passed at construction. `None` marks an absent cell.
    pub fn observe_row<'a>(&mut self, values: impl IntoIterator<Item = Option<&'a str>>) {
        if !self.sampling() {
            return;
        }
        self.rows_seen += 1;
        for (tally, value) in self.tallies.iter_mut().zip(values) {
            let Some(raw) = value else { continue };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            tally.non_empty += 1;
            if NaiveDateTime::parse_from_str(trimmed, DATE_TIME_FORMAT).is_ok() {
                tally.date_time += 1;
            } else if NaiveDate::parse_from_str(trimmed, DATE_FORMAT).is_ok() {
                tally.date_only += 1;
            }
        }
    }

    /// Picks the format for each column: the fixed pattern that matched a
    /// strict majority of sampled non-empty values, else the flexible path.
    pub fn decide(&self) -> Vec<ColumnFormat> {
        self.tallies
            .iter()
            .map(|tally| {
                let threshold = tally.non_empty / 2;
                if tally.non_empty == 0 {
                    ColumnFormat::Flexible
                } else if tally.date_time > threshold {
                    ColumnFormat::DateTime
                } else if tally.date_only > threshold {
                    ColumnFormat::DateOnly
                } else {
                    ColumnFormat::Flexible
                }
            })
            .collect()
    }
}
