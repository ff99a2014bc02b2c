//! Lightweight column projections over declared files.
//!
//! These readers pull only the named columns out of a CSV, without building
//! full rows: observed-value collection for domain seeding, join pairs for
//! anchor attachment, and earliest-timestamp anchors for the year-start
//! offset policy.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::ReaderBuilder;

use veil_core::parse_flexible;

fn open_reader(path: &Path) -> Result<(csv::Reader<std::fs::File>, Vec<String>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("read csv: {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("read headers: {}", path.display()))?
        .iter()
        .map(|h| h.trim().trim_matches('\u{feff}').to_string())
        .collect();
    Ok((reader, headers))
}

fn column_index(headers: &[String], column: &str) -> Option<usize> {
    headers.iter().position(|h| h == column)
}

/// Distinct non-empty values for each requested column. Columns absent from
/// the file yield empty sets.
pub fn collect_column_values(
    path: &Path,
    columns: &[String],
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let (mut reader, headers) = open_reader(path)?;
    let indices: Vec<(String, Option<usize>)> = columns
        .iter()
        .map(|c| (c.clone(), column_index(&headers, c)))
        .collect();
    let mut values: BTreeMap<String, BTreeSet<String>> = columns
        .iter()
        .map(|c| (c.clone(), BTreeSet::new()))
        .collect();
    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .with_context(|| format!("read record: {}", path.display()))?
    {
        for (column, idx) in &indices {
            let Some(idx) = idx else { continue };
            let cell = record.get(*idx).unwrap_or("").trim();
            if cell.is_empty() {
                continue;
            }
            if let Some(set) = values.get_mut(column) {
                set.insert(cell.to_string());
            }
        }
    }
    Ok(values)
}

/// `(key, anchor_id)` pairs for building a join index. Rows with an empty
/// key or anchor are skipped; duplicate handling is the index's concern.
pub fn collect_join_pairs(
    path: &Path,
    key_column: &str,
    anchor_column: &str,
) -> Result<Vec<(String, String)>> {
    let (mut reader, headers) = open_reader(path)?;
    let (Some(key_idx), Some(anchor_idx)) = (
        column_index(&headers, key_column),
        column_index(&headers, anchor_column),
    ) else {
        return Ok(Vec::new());
    };
    let mut pairs = Vec::new();
    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .with_context(|| format!("read record: {}", path.display()))?
    {
        let key = record.get(key_idx).unwrap_or("").trim();
        let anchor = record.get(anchor_idx).unwrap_or("").trim();
        if key.is_empty() || anchor.is_empty() {
            continue;
        }
        pairs.push((key.to_string(), anchor.to_string()));
    }
    Ok(pairs)
}

/// Earliest parsable timestamp per entity across the given time columns.
/// Feeds year-start offset anchors.
pub fn collect_earliest_timestamps(
    path: &Path,
    entity_column: &str,
    time_columns: &[String],
) -> Result<BTreeMap<String, NaiveDateTime>> {
    let (mut reader, headers) = open_reader(path)?;
    let Some(entity_idx) = column_index(&headers, entity_column) else {
        return Ok(BTreeMap::new());
    };
    let time_indices: Vec<usize> = time_columns
        .iter()
        .filter_map(|c| column_index(&headers, c))
        .collect();
    let mut earliest: BTreeMap<String, NaiveDateTime> = BTreeMap::new();
    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .with_context(|| format!("read record: {}", path.display()))?
    {
        let entity = record.get(entity_idx).unwrap_or("").trim();
        if entity.is_empty() {
            continue;
        }
        for idx in &time_indices {
            let Some(ts) = parse_flexible(record.get(*idx).unwrap_or("")) else {
                continue;
            };
            earliest
                .entry(entity.to_string())
                .and_modify(|current| {
                    if ts < *current {
                        *current = ts;
                    }
                })
                .or_insert(ts);
        }
    }
    Ok(earliest)
}
