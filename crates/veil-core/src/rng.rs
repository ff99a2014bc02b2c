//! Seeded pseudo-random generation for surrogate values and offsets.
//!
//! Splitmix64 keeps runs reproducible under an explicit seed without pulling
//! in a randomness dependency; the statistical quality is more than enough
//! for drawing surrogate candidates and offset durations.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seeds from the system clock and process id. Used when the
    /// configuration carries no explicit seed.
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::new(nanos ^ (u64::from(std::process::id()) << 32))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform draw in `[0, bound)` without modulo bias.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let zone = u64::MAX - u64::MAX % bound;
        loop {
            let value = self.next_u64();
            if value < zone {
                return value % bound;
            }
        }
    }

    /// Uniform draw in `[-bound, +bound]`, never exactly zero. Safe for
    /// any positive bound up to `i64::MAX`: the signed result is derived
    /// from an unsigned distance so the arithmetic cannot overflow.
    pub fn next_signed_nonzero(&mut self, bound: i64) -> i64 {
        debug_assert!(bound > 0);
        let magnitude = bound as u64;
        let span = 2 * magnitude + 1;
        loop {
            let value = self.next_below(span);
            if value == magnitude {
                continue;
            }
            return if value > magnitude {
                (value - magnitude) as i64
            } else {
                -((magnitude - value) as i64)
            };
        }
    }
}
