//! Simulation clock and determinism hash.

use crate::fixed::{Fixed64, Millis};

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// The line's conceptual clock. Advanced only by the line itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Number of completed `simulation_step` calls.
    pub tick: u64,
    /// Simulated time: the sum of all step durations so far.
    pub time: Millis,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one step of `dt`. Returns the new time.
    pub fn advance(&mut self, dt: Millis) -> Millis {
        self.tick += 1;
        self.time = self.time.saturating_add(dt);
        self.time
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of line state for divergence detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_usize(&mut self, v: usize) {
        self.write_u64(v as u64);
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Feed an optional value as a presence tag plus payload.
    pub fn write_opt_u64(&mut self, v: Option<u64>) {
        match v {
            Some(v) => {
                self.write(&[1]);
                self.write_u64(v);
            }
            None => self.write(&[0]),
        }
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_state_starts_at_zero() {
        let state = SimState::new();
        assert_eq!(state.tick, 0);
        assert_eq!(state.time, 0);
    }

    #[test]
    fn advance_counts_ticks_and_time() {
        let mut state = SimState::new();
        state.advance(100);
        assert_eq!(state.advance(250), 350);
        assert_eq!(state.tick, 2);
    }

    #[test]
    fn state_hash_deterministic() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_opt_u64(Some(7));

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_opt_u64(Some(7));

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_distinguishes_none_from_zero() {
        let mut h1 = StateHash::new();
        h1.write_opt_u64(None);

        let mut h2 = StateHash::new();
        h2.write_opt_u64(Some(0));

        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_order_matters() {
        let mut h1 = StateHash::new();
        h1.write_u64(1);
        h1.write_u64(2);

        let mut h2 = StateHash::new();
        h2.write_u64(2);
        h2.write_u64(1);

        assert_ne!(h1.finish(), h2.finish());
    }
}
