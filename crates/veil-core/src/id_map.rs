//! Per-domain substitution table mapping original identifiers to surrogates.
//!
//! Invariants: injective (no two originals share a surrogate), surrogates
//! never reused within one map, and append-only: entries are never changed
//! or removed once assigned.

use std::collections::{BTreeMap, BTreeSet};

use veil_model::{Result, VeilError};

use crate::allocate::SurrogateAllocator;

/// Whether an unseen original allocates a new surrogate or degrades to
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Lazily allocate surrogates for previously-unseen originals.
    Update,
    /// Read-only: unseen originals miss instead of allocating.
    Frozen,
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    forward: BTreeMap<String, u64>,
    inverse: BTreeMap<u64, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates one surrogate per distinct original upfront.
    ///
    /// `surrogate_column` names the replacement column for persistence and
    /// must differ from the identifier column itself; reusing the name would
    /// make the exported table ambiguous.
    pub fn build(
        values: impl IntoIterator<Item = String>,
        id_column: &str,
        surrogate_column: &str,
        allocator: &mut SurrogateAllocator,
    ) -> Result<Self> {
        if id_column == surrogate_column {
            return Err(VeilError::NameCollision(surrogate_column.to_string()));
        }
        let originals: BTreeSet<String> = values.into_iter().collect();
        let surrogates = allocator.allocate(originals.len(), &BTreeSet::new())?;
        let mut map = Self::new();
        for (original, surrogate) in originals.into_iter().zip(surrogates) {
            map.forward.insert(original.clone(), surrogate);
            map.inverse.insert(surrogate, original);
        }
        Ok(map)
    }

    /// Reconstructs a map from persisted `(original, surrogate)` pairs.
    ///
    /// Duplicate originals or duplicate surrogates violate injectivity and
    /// are rejected; a half-trusted snapshot must not silently re-identify.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, u64)>) -> Result<Self> {
        let mut map = Self::new();
        for (original, surrogate) in pairs {
            if let Some(existing) = map.forward.get(&original) {
                if *existing != surrogate {
                    return Err(VeilError::Config(format!(
                        "conflicting surrogates for original '{original}' in persisted map"
                    )));
                }
                continue;
            }
            if map.inverse.contains_key(&surrogate) {
                return Err(VeilError::Config(format!(
                    "surrogate {surrogate} assigned to more than one original in persisted map"
                )));
            }
            map.forward.insert(original.clone(), surrogate);
            map.inverse.insert(surrogate, original);
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn lookup(&self, original: &str) -> Option<u64> {
        self.forward.get(original).copied()
    }

    pub fn invert(&self, surrogate: u64) -> Option<&str> {
        self.inverse.get(&surrogate).map(String::as_str)
    }

    /// Every surrogate currently assigned; the allocator exclusion set.
    pub fn assigned(&self) -> BTreeSet<u64> {
        self.inverse.keys().copied().collect()
    }

    /// Looks up `original`, allocating a fresh surrogate first when unseen.
    pub fn get_or_allocate(
        &mut self,
        original: &str,
        allocator: &mut SurrogateAllocator,
    ) -> Result<u64> {
        if let Some(surrogate) = self.forward.get(original) {
            return Ok(*surrogate);
        }
        let assigned = self.assigned();
        let fresh = allocator.allocate(1, &assigned)?[0];
        self.forward.insert(original.to_string(), fresh);
        self.inverse.insert(fresh, original.to_string());
        Ok(fresh)
    }

    /// Deterministic export order: sorted by original value.
    pub fn export(&self) -> Vec<(String, u64)> {
        self.forward
            .iter()
            .map(|(original, surrogate)| (original.clone(), *surrogate))
            .collect()
    }
}
