//! Collision-free surrogate value generation.

use std::collections::BTreeSet;

use veil_model::{Result, VeilError};

use crate::rng::SplitMix64;

/// Candidates are drawn in batches; rejected duplicates are retried until the
/// requested count is accepted. The value space is never materialized.
const BATCH_SIZE: usize = 1000;

/// Generates surrogate values without replacement from a bounded integer
/// space `[0, space)`. Pure with respect to identifier maps: the caller
/// passes the already-assigned values as the exclusion set and merges the
/// result back itself.
#[derive(Debug, Clone)]
pub struct SurrogateAllocator {
    space: u64,
    rng: SplitMix64,
}

impl SurrogateAllocator {
    pub fn new(space: u64) -> Self {
        Self {
            space,
            rng: SplitMix64::from_entropy(),
        }
    }

    pub fn with_seed(space: u64, seed: u64) -> Self {
        Self {
            space,
            rng: SplitMix64::new(seed),
        }
    }

    pub fn space(&self) -> u64 {
        self.space
    }

    /// Draws `n` values disjoint from `exclude` and internally distinct.
    ///
    /// Fails with [`VeilError::CapacityExceeded`] when the space cannot hold
    /// `n` more values beyond the exclusion set.
    pub fn allocate(&mut self, n: usize, exclude: &BTreeSet<u64>) -> Result<Vec<u64>> {
        let available = self.space.saturating_sub(exclude.len() as u64);
        if n as u64 > available {
            return Err(VeilError::CapacityExceeded {
                needed: n as u64,
                available,
                space: self.space,
            });
        }
        let mut accepted: Vec<u64> = Vec::with_capacity(n);
        let mut taken: BTreeSet<u64> = BTreeSet::new();
        while accepted.len() < n {
            for _ in 0..BATCH_SIZE {
                if accepted.len() == n {
                    break;
                }
                let candidate = self.rng.next_below(self.space);
                if exclude.contains(&candidate) || !taken.insert(candidate) {
                    continue;
                }
                accepted.push(candidate);
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::SurrogateAllocator;
    use veil_model::VeilError;

    #[test]
    fn allocations_are_distinct_and_disjoint_from_exclusions() {
        let mut allocator = SurrogateAllocator::with_seed(100, 1);
        let exclude: BTreeSet<u64> = (0..50).collect();
        let values = allocator.allocate(40, &exclude).expect("allocate");
        assert_eq!(values.len(), 40);
        let unique: BTreeSet<u64> = values.iter().copied().collect();
        assert_eq!(unique.len(), 40);
        assert!(unique.is_disjoint(&exclude));
        assert!(values.iter().all(|v| *v < 100));
    }

    #[test]
    fn capacity_exceeded_when_space_too_small() {
        let mut allocator = SurrogateAllocator::with_seed(10, 1);
        let exclude: BTreeSet<u64> = (0..8).collect();
        let err = allocator.allocate(3, &exclude).unwrap_err();
        assert!(matches!(err, VeilError::CapacityExceeded { .. }));
    }

    #[test]
    fn can_drain_a_tiny_space_exactly() {
        let mut allocator = SurrogateAllocator::with_seed(8, 3);
        let values = allocator.allocate(8, &BTreeSet::new()).expect("allocate");
        let unique: BTreeSet<u64> = values.into_iter().collect();
        assert_eq!(unique, (0..8).collect());
    }

    #[test]
    fn seeded_allocation_is_deterministic() {
        let mut a = SurrogateAllocator::with_seed(1_000_000, 42);
        let mut b = SurrogateAllocator::with_seed(1_000_000, 42);
        let exclude = BTreeSet::new();
        assert_eq!(
            a.allocate(100, &exclude).unwrap(),
            b.allocate(100, &exclude).unwrap()
        );
    }
}
