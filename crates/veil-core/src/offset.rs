//! Entity-consistent datetime shifting.
//!
//! One signed offset per entity id, applied identically to every datetime
//! column of that entity in every file. Offsets are stored as whole
//! nanoseconds so persisted maps round-trip exactly, with no floating-point
//! drift between runs.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};

use veil_model::{Result, VeilError};

use crate::rng::SplitMix64;

pub const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// De-identify (add the offset) or re-identify (subtract it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// How offsets for unseen entities are produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OffsetPolicy {
    /// Uniform in `[-max_days, +max_days]`, never exactly zero. With
    /// `whole_days` the draw happens at day granularity, matching inputs
    /// where date-only columns dominate; otherwise at nanosecond
    /// granularity, which also shifts the time of day.
    Random { max_days: i64, whole_days: bool },
    /// Offset = entity's earliest observed timestamp minus midnight of
    /// January 1 of that timestamp's year. Requires anchors collected in a
    /// pre-scan; entities without an anchor miss instead of allocating.
    YearStart,
}

#[derive(Debug, Clone)]
pub struct OffsetMap {
    offsets: BTreeMap<String, i64>,
    policy: OffsetPolicy,
}

impl OffsetMap {
    pub fn new(policy: OffsetPolicy) -> Self {
        Self {
            offsets: BTreeMap::new(),
            policy,
        }
    }

    /// Restores a map from persisted `(entity_id, offset_nanoseconds)`
    /// pairs. Conflicting duplicates are rejected: one entity must shift
    /// identically everywhere.
    pub fn from_pairs(
        policy: OffsetPolicy,
        pairs: impl IntoIterator<Item = (String, i64)>,
    ) -> Result<Self> {
        let mut map = Self::new(policy);
        for (entity, nanos) in pairs {
            match map.offsets.get(&entity) {
                Some(existing) if *existing != nanos => {
                    return Err(VeilError::Config(format!(
                        "conflicting offsets for entity '{entity}' in persisted map"
                    )));
                }
                _ => {
                    map.offsets.insert(entity, nanos);
                }
            }
        }
        Ok(map)
    }

    pub fn policy(&self) -> OffsetPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn get(&self, entity: &str) -> Option<i64> {
        self.offsets.get(entity).copied()
    }

    /// Returns the entity's offset, drawing a fresh one under the random
    /// policy when unseen. Year-start offsets are never drawn lazily (the
    /// earliest observed timestamp is only known after a pre-scan), so an
    /// unseen entity yields `None` and the caller records a lookup miss.
    pub fn get_or_allocate(&mut self, entity: &str, rng: &mut SplitMix64) -> Option<i64> {
        if let Some(nanos) = self.offsets.get(entity) {
            return Some(*nanos);
        }
        match self.policy {
            OffsetPolicy::Random {
                max_days,
                whole_days,
            } => {
                // `max_days` can exceed what fits in nanoseconds; clamp the
                // range so the draw and the multiply stay in i64.
                let capped = max_days.min(i64::MAX / NANOS_PER_DAY);
                let nanos = if whole_days {
                    rng.next_signed_nonzero(capped) * NANOS_PER_DAY
                } else {
                    rng.next_signed_nonzero(capped * NANOS_PER_DAY)
                };
                self.offsets.insert(entity.to_string(), nanos);
                Some(nanos)
            }
            OffsetPolicy::YearStart => None,
        }
    }

    /// Registers year-start anchors from a pre-scan of the entity's
    /// earliest observed timestamp. First registration wins; the map is
    /// append-only.
    pub fn register_year_start_anchor(&mut self, entity: &str, anchor: NaiveDateTime) {
        if self.offsets.contains_key(entity) {
            return;
        }
        self.offsets
            .insert(entity.to_string(), year_start_offset(anchor));
    }

    /// Deterministic export order: sorted by entity id.
    pub fn export(&self) -> Vec<(String, i64)> {
        self.offsets
            .iter()
            .map(|(entity, nanos)| (entity.clone(), *nanos))
            .collect()
    }
}

/// Applies an offset to a timestamp. `None` on overflow; the caller
/// degrades the field rather than aborting the row.
pub fn shift(ts: NaiveDateTime, offset_nanos: i64, direction: Direction) -> Option<NaiveDateTime> {
    let signed = match direction {
        Direction::Forward => offset_nanos,
        Direction::Reverse => -offset_nanos,
    };
    ts.checked_add_signed(TimeDelta::nanoseconds(signed))
}

fn year_start_offset(anchor: NaiveDateTime) -> i64 {
    let year_start = NaiveDate::from_ymd_opt(anchor.year(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(anchor);
    (anchor - year_start).num_nanoseconds().unwrap_or(0)
}
