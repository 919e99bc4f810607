//! Injected randomness for breakdowns, duration variance and head injection.
//!
//! The line owns exactly one [`RandomSource`] and lends it to each machine's
//! `update`, so a seeded source makes a whole run reproducible. The default
//! source is [`SimRng`] (SplitMix64): fast, 8 bytes of state, excellent
//! statistical properties, and trivially serializable.

use crate::fixed::{Fixed64, Millis};

/// A source of pseudo-random bits.
///
/// Only [`next_u64`](Self::next_u64) is required; the derived draws are
/// provided so every implementation maps bits to outcomes identically.
pub trait RandomSource {
    /// Generate the next `u64` in the sequence.
    fn next_u64(&mut self) -> u64;

    /// Returns `true` with the given probability (Fixed64 in [0, 1]).
    ///
    /// - probability <= 0 always returns false without consuming a draw
    /// - probability >= 1 always returns true without consuming a draw
    fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0,1) the Q32.32 raw bits are the fraction scaled to
        // [0, 2^32). Compare a uniform u32 against them.
        let upper = self.next_u64() >> 32;
        upper < probability.to_bits() as u64
    }

    /// Uniform integer offset in `[-variance, +variance]`.
    ///
    /// Zero variance returns 0 without consuming a draw.
    fn uniform_offset(&mut self, variance: Millis) -> i64 {
        if variance == 0 {
            return 0;
        }
        let variance = variance.min(i64::MAX as u64 / 2);
        let span = variance * 2 + 1;
        (self.next_u64() % span) as i64 - variance as i64
    }

    /// `base + uniform(-variance, +variance)`, saturating at zero.
    fn draw_duration(&mut self, base: Millis, variance: Millis) -> Millis {
        let offset = self.uniform_offset(variance);
        if offset >= 0 {
            base.saturating_add(offset as u64)
        } else {
            base.saturating_sub(offset.unsigned_abs())
        }
    }
}

/// SplitMix64 pseudo-random number generator.
///
/// Deterministic across platforms.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Get the internal state (for hashing/serialization).
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl RandomSource for SimRng {
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}
