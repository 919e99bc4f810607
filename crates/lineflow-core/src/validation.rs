//! State comparison and determinism checking for lines.
//!
//! Two lines built from the same configuration and seed must stay identical
//! tick for tick. These helpers locate where two runs diverge.

use crate::line::{hash_machine, Line};
use crate::rng::RandomSource;
use crate::sim::StateHash;

// ---------------------------------------------------------------------------
// State diff types
// ---------------------------------------------------------------------------

/// Difference between two lines at the machine level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineDiff {
    /// Machine position exists only in line A.
    OnlyInA(usize),
    /// Machine position exists only in line B.
    OnlyInB(usize),
    /// Same position, different state.
    StateMismatch { index: usize, description: String },
}

/// Full state diff between two lines.
#[derive(Debug, Clone)]
pub struct LineDiff {
    pub is_identical: bool,
    pub clock_matches: bool,
    pub counters_match: bool,
    pub finished_goods_match: bool,
    pub machine_diffs: Vec<MachineDiff>,
}

// ---------------------------------------------------------------------------
// Full diff
// ---------------------------------------------------------------------------

/// Compute a detailed diff between two line states.
pub fn diff_lines<A: RandomSource, B: RandomSource>(a: &Line<A>, b: &Line<B>) -> LineDiff {
    let clock_matches = a.tick() == b.tick() && a.global_time() == b.global_time();
    let counters_match = a.items_created() == b.items_created();
    let finished_goods_match = a.finished_goods() == b.finished_goods();

    let mut machine_diffs = Vec::new();
    let shared = a.machines().len().min(b.machines().len());

    for (index, (ma, mb)) in a.machines().iter().zip(b.machines()).enumerate() {
        let mut mismatches = Vec::new();
        if ma.id() != mb.id() {
            mismatches.push("id");
        }
        if ma.state() != mb.state() || ma.time_in_state() != mb.time_in_state() {
            mismatches.push("state");
        }
        if ma.buffer() != mb.buffer() {
            mismatches.push("buffer");
        }
        if ma.current_item() != mb.current_item() || ma.progress() != mb.progress() {
            mismatches.push("current_item");
        }
        if ma.blocked_item() != mb.blocked_item() {
            mismatches.push("blocked_item");
        }
        if ma.metrics() != mb.metrics() {
            mismatches.push("metrics");
        }
        if !mismatches.is_empty() {
            machine_diffs.push(MachineDiff::StateMismatch {
                index,
                description: mismatches.join(", "),
            });
        }
    }
    machine_diffs.extend((shared..a.machines().len()).map(MachineDiff::OnlyInA));
    machine_diffs.extend((shared..b.machines().len()).map(MachineDiff::OnlyInB));

    LineDiff {
        is_identical: clock_matches
            && counters_match
            && finished_goods_match
            && machine_diffs.is_empty(),
        clock_matches,
        counters_match,
        finished_goods_match,
        machine_diffs,
    }
}

/// Per-machine state hashes, in line order.
pub fn machine_hashes<R: RandomSource>(line: &Line<R>) -> Vec<u64> {
    line.machines()
        .iter()
        .map(|m| {
            let mut h = StateHash::new();
            hash_machine(&mut h, m);
            h.finish()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// Tick at which divergence was first detected (if any).
    pub divergence_tick: Option<u64>,
    /// `(tick, hash_a, hash_b)` for each tick.
    pub hash_log: Vec<(u64, u64, u64)>,
}

/// Build two lines with `build` and run both for `ticks` steps of `dt`,
/// comparing state hashes after every step.
pub fn validate_determinism<R, F>(build: F, ticks: u64, dt: u64) -> DeterminismResult
where
    R: RandomSource,
    F: Fn() -> Line<R>,
{
    let mut line_a = build();
    let mut line_b = build();

    let mut hash_log = Vec::with_capacity(ticks as usize);
    let mut divergence_tick = None;

    for _ in 0..ticks {
        line_a.simulation_step(dt);
        line_b.simulation_step(dt);

        let hash_a = line_a.state_hash();
        let hash_b = line_b.state_hash();
        let tick = line_a.tick();
        hash_log.push((tick, hash_a, hash_b));

        if hash_a != hash_b && divergence_tick.is_none() {
            divergence_tick = Some(tick);
        }
    }

    DeterminismResult {
        is_deterministic: divergence_tick.is_none(),
        divergence_tick,
        hash_log,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
