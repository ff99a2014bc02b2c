//! Per-file row transformation pipeline.
//!
//! The pipeline owns one identifier map per resolved domain and the offset
//! map for the temporal anchor, for the lifetime of a whole multi-file run.
//! Files are processed strictly sequentially: a later file may extend the
//! same maps an earlier file already consulted.
//!
//! Per row the forward order is fixed: temporal shift on the declared
//! datetime columns (keyed by the still-original anchor id), identifier
//! substitution, exclusion of dropped columns, emission. The reverse
//! direction inverts identifiers first so the recovered anchor id can key
//! the offset lookup. Row emission order equals input order; nothing is
//! buffered beyond the format-inference sample window.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use veil_model::{FileConfig, FileSummary, Result, ShiftStatus, Value, VeilError};

use crate::alias::DomainPlan;
use crate::allocate::SurrogateAllocator;
use crate::datetime::{ColumnFormat, DATE_FORMAT, DATE_TIME_FORMAT, FormatSampler};
use crate::id_map::{IdentifierMap, LookupMode};
use crate::io::{RowSink, RowSource};
use crate::join::JoinIndex;
use crate::offset::{Direction, OffsetMap, shift};
use crate::rng::SplitMix64;

use chrono::{NaiveDate, NaiveDateTime};

/// How the anchor id is attached to a file's rows.
#[derive(Debug, Clone)]
pub enum AnchorResolution {
    /// The anchor column (or an alias member) is present directly.
    Column(String),
    /// The anchor id is looked up through a cross-file join index keyed by
    /// `key_column`.
    Joined {
        key_column: String,
        index: JoinIndex,
    },
    /// No anchor available; datetime columns pass through unshifted.
    Skipped,
}

pub struct Pipeline {
    plan: DomainPlan,
    id_maps: Vec<IdentifierMap>,
    offsets: OffsetMap,
    allocator: SurrogateAllocator,
    offset_rng: SplitMix64,
    datetime_base: String,
    mode: LookupMode,
}

impl Pipeline {
    pub fn new(
        plan: DomainPlan,
        offsets: OffsetMap,
        allocator: SurrogateAllocator,
        datetime_base: impl Into<String>,
    ) -> Self {
        let id_maps = (0..plan.len()).map(|_| IdentifierMap::new()).collect();
        Self {
            plan,
            id_maps,
            offsets,
            allocator,
            offset_rng: SplitMix64::from_entropy(),
            datetime_base: datetime_base.into(),
            mode: LookupMode::Update,
        }
    }

    pub fn with_mode(mut self, mode: LookupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Seeds offset drawing; used together with a seeded allocator for
    /// reproducible runs.
    pub fn with_offset_rng(mut self, rng: SplitMix64) -> Self {
        self.offset_rng = rng;
        self
    }

    /// Replaces a domain's empty map with one restored from persistence.
    pub fn restore_id_map(&mut self, domain: &str, map: IdentifierMap) -> Result<()> {
        let idx = self
            .plan
            .index_by_name(domain)
            .ok_or_else(|| VeilError::Config(format!("unknown identifier domain '{domain}'")))?;
        self.id_maps[idx] = map;
        Ok(())
    }

    /// Pre-builds a domain's map from values observed in a projection pass.
    /// Already-known originals keep their surrogates; only new ones
    /// allocate.
    pub fn seed_domain_values(
        &mut self,
        domain: &str,
        values: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let idx = self
            .plan
            .index_by_name(domain)
            .ok_or_else(|| VeilError::Config(format!("unknown identifier domain '{domain}'")))?;
        for value in values {
            if value.trim().is_empty() {
                continue;
            }
            self.id_maps[idx].get_or_allocate(&value, &mut self.allocator)?;
        }
        Ok(())
    }

    pub fn plan(&self) -> &DomainPlan {
        &self.plan
    }

    pub fn id_map(&self, domain: &str) -> Option<&IdentifierMap> {
        self.plan.index_by_name(domain).map(|idx| &self.id_maps[idx])
    }

    pub fn offsets(&self) -> &OffsetMap {
        &self.offsets
    }

    pub fn offsets_mut(&mut self) -> &mut OffsetMap {
        &mut self.offsets
    }

    pub fn datetime_base(&self) -> &str {
        &self.datetime_base
    }

    /// Resolves which header carries the anchor id for a file, if any.
    pub fn resolve_anchor_column<'a>(&self, headers: &'a [String]) -> Option<&'a str> {
        self.plan.anchor_column_in(&self.datetime_base, headers)
    }

    /// Streams one file through the pipeline. Output row count equals input
    /// row count; output columns equal input columns minus exclusions.
    pub fn process_file(
        &mut self,
        file_name: &str,
        decl: &FileConfig,
        anchor: AnchorResolution,
        direction: Direction,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
    ) -> Result<FileSummary> {
        let headers = source.field_names()?;
        let excluded: BTreeSet<&str> = decl
            .exclude
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let out_headers: Vec<String> = headers
            .iter()
            .filter(|h| !excluded.contains(h.as_str()))
            .cloned()
            .collect();
        sink.write_header(&out_headers)?;

        let mut summary = FileSummary::new(file_name);
        for column in decl.id.iter().chain(&decl.datetime) {
            if !headers.contains(column) {
                warn!(file = file_name, column = %column, "declared column absent from file");
                summary.record_lookup_miss(column);
            }
        }

        let time_columns: Vec<String> = decl
            .datetime
            .iter()
            .filter(|c| headers.contains(c))
            .cloned()
            .collect();
        summary.shift = if decl.datetime.is_empty() {
            ShiftStatus::NotRequested
        } else {
            match &anchor {
                AnchorResolution::Column(_) => ShiftStatus::Direct,
                AnchorResolution::Joined { .. } => ShiftStatus::Joined,
                AnchorResolution::Skipped => ShiftStatus::Skipped,
            }
        };
        if summary.shift == ShiftStatus::Skipped && !decl.datetime.is_empty() {
            warn!(
                file = file_name,
                "anchor id unavailable; datetime columns pass through unshifted"
            );
        }

        let mut sampler = FormatSampler::new(time_columns.len());
        let mut formats: Option<Vec<ColumnFormat>> = None;
        let mut warned_frozen: BTreeSet<String> = BTreeSet::new();

        while let Some(mut row) = source.next_row()? {
            summary.rows_in += 1;
            if formats.is_none() {
                sampler.observe_row(
                    time_columns
                        .iter()
                        .map(|c| row.get(c).and_then(Value::as_text)),
                );
                if !sampler.sampling() {
                    let decided = sampler.decide();
                    debug!(file = file_name, ?decided, "datetime formats inferred");
                    formats = Some(decided);
                }
            }
            match direction {
                Direction::Forward => {
                    self.shift_time_columns(
                        &mut row,
                        &time_columns,
                        &anchor,
                        direction,
                        formats.as_deref(),
                        &mut summary,
                    );
                    self.substitute_ids(&mut row, decl, direction, &mut warned_frozen, &mut summary)?;
                }
                Direction::Reverse => {
                    self.substitute_ids(&mut row, decl, direction, &mut warned_frozen, &mut summary)?;
                    self.shift_time_columns(
                        &mut row,
                        &time_columns,
                        &anchor,
                        direction,
                        formats.as_deref(),
                        &mut summary,
                    );
                }
            }
            for column in &excluded {
                row.remove(column);
            }
            sink.write_row(&row)?;
            summary.rows_out += 1;
        }
        debug!(
            file = file_name,
            rows = summary.rows_out,
            lookup_misses = summary.total_lookup_misses(),
            parse_failures = summary.total_parse_failures(),
            "file closed"
        );
        Ok(summary)
    }

    fn resolve_entity(&self, row: &veil_model::Row, anchor: &AnchorResolution) -> Option<String> {
        match anchor {
            AnchorResolution::Column(column) => row
                .get(column)
                .and_then(Value::as_text)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
            AnchorResolution::Joined { key_column, index } => row
                .get(key_column)
                .and_then(Value::as_text)
                .map(str::trim)
                .and_then(|key| index.lookup(key))
                .map(String::from),
            AnchorResolution::Skipped => None,
        }
    }

    fn shift_time_columns(
        &mut self,
        row: &mut veil_model::Row,
        time_columns: &[String],
        anchor: &AnchorResolution,
        direction: Direction,
        formats: Option<&[ColumnFormat]>,
        summary: &mut FileSummary,
    ) {
        if time_columns.is_empty() || matches!(anchor, AnchorResolution::Skipped) {
            return;
        }
        let entity = self.resolve_entity(row, anchor);
        let offset = match entity.as_deref() {
            Some(entity) if direction == Direction::Forward && self.mode == LookupMode::Update => {
                self.offsets.get_or_allocate(entity, &mut self.offset_rng)
            }
            Some(entity) => self.offsets.get(entity),
            None => None,
        };
        let Some(offset) = offset else {
            // Missing or unknown entity: every time field degrades rather
            // than leaking an unshifted date.
            let anchor_name = match anchor {
                AnchorResolution::Column(column) => column.as_str(),
                AnchorResolution::Joined { key_column, .. } => key_column.as_str(),
                AnchorResolution::Skipped => unreachable!(),
            };
            summary.record_lookup_miss(anchor_name);
            for column in time_columns {
                row.set(column, Value::Missing);
            }
            return;
        };
        for (idx, column) in time_columns.iter().enumerate() {
            let raw = match row.get(column).and_then(Value::as_text) {
                Some(raw) => raw.trim().to_string(),
                None => continue,
            };
            if raw.is_empty() {
                row.set(column, Value::Missing);
                continue;
            }
            let format = match formats {
                Some(decided) => decided[idx],
                None => detect_value_format(&raw),
            };
            match format.parse(&raw).and_then(|ts| shift(ts, offset, direction)) {
                Some(shifted) => {
                    row.set(column, Value::text(format.render(shifted)));
                }
                None => {
                    row.set(column, Value::Missing);
                    summary.record_parse_failure(column);
                }
            }
        }
    }

    fn substitute_ids(
        &mut self,
        row: &mut veil_model::Row,
        decl: &FileConfig,
        direction: Direction,
        warned_frozen: &mut BTreeSet<String>,
        summary: &mut FileSummary,
    ) -> Result<()> {
        for column in &decl.id {
            let Some(idx) = self.plan.domain_of(column) else {
                continue;
            };
            let raw = match row.get(column).and_then(Value::as_text) {
                Some(raw) => raw.trim().to_string(),
                None => continue,
            };
            if raw.is_empty() {
                row.set(column, Value::Missing);
                continue;
            }
            match direction {
                Direction::Forward => match self.mode {
                    LookupMode::Update => {
                        let surrogate =
                            self.id_maps[idx].get_or_allocate(&raw, &mut self.allocator)?;
                        row.set(column, Value::text(surrogate.to_string()));
                    }
                    LookupMode::Frozen => match self.id_maps[idx].lookup(&raw) {
                        Some(surrogate) => {
                            row.set(column, Value::text(surrogate.to_string()));
                        }
                        None => {
                            // Null instead of pass-through: an untouched
                            // original in the output would re-identify.
                            if warned_frozen.insert(column.clone()) {
                                warn!(column = %column, "unseen original in frozen map");
                            }
                            row.set(column, Value::Missing);
                            summary.record_lookup_miss(column);
                        }
                    },
                },
                Direction::Reverse => {
                    let original = raw
                        .parse::<u64>()
                        .ok()
                        .and_then(|s| self.id_maps[idx].invert(s))
                        .map(str::to_string);
                    match original {
                        Some(original) => {
                            row.set(column, Value::text(original));
                        }
                        None => {
                            row.set(column, Value::Missing);
                            summary.record_lookup_miss(column);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-value format detection used inside the sample window, where the
/// column format is not yet decided. Fixed patterns are preferred so the
/// render side stays consistent with the post-inference fast path.
fn detect_value_format(raw: &str) -> ColumnFormat {
    if NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT).is_ok() {
        ColumnFormat::DateTime
    } else if NaiveDate::parse_from_str(raw, DATE_FORMAT).is_ok() {
        ColumnFormat::DateOnly
    } else {
        ColumnFormat::Flexible
    }
}
