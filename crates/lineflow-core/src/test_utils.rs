//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::{LineConfig, MachineConfig};
use crate::fixed::{Fixed64, Millis};
use crate::item::Item;
use crate::line::Line;
use crate::machine::MachineState;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Machine constructors
// ===========================================================================

/// A never-failing machine with constant process time.
pub fn steady(id: &str, process_ms: Millis, capacity: usize) -> MachineConfig {
    MachineConfig::new(id, id.to_uppercase(), process_ms, capacity)
}

/// A machine with process variance and a failure profile.
pub fn unreliable(
    id: &str,
    process_ms: Millis,
    variance_ms: Millis,
    failure_rate: f64,
    capacity: usize,
) -> MachineConfig {
    steady(id, process_ms, capacity)
        .with_process_variance(variance_ms)
        .with_failures(failure_rate, process_ms * 2, process_ms / 2)
}

// ===========================================================================
// Line builders
// ===========================================================================

/// Line parameters with automatic injection turned off.
pub fn manual_config() -> LineConfig {
    LineConfig {
        injection_probability: 0.0,
        ..LineConfig::default()
    }
}

/// Line parameters with the given injection probability and seed.
pub fn seeded_config(injection_probability: f64, seed: u64) -> LineConfig {
    LineConfig {
        injection_probability,
        seed,
        ..LineConfig::default()
    }
}

/// The three-stage cut/weld/paint line used across scenario tests.
pub fn three_stage_machines() -> Vec<MachineConfig> {
    vec![
        steady("cut", 400, 3).with_process_variance(100),
        steady("weld", 700, 2)
            .with_process_variance(200)
            .with_failures(0.05, 2000, 500),
        steady("paint", 500, 2).with_process_variance(100),
    ]
}

pub fn three_stage_line(seed: u64) -> Line {
    build(seeded_config(0.4, seed), three_stage_machines())
}

/// `n` identical unreliable machines.
pub fn long_line(n: usize, seed: u64) -> Line {
    let machines = (0..n)
        .map(|i| unreliable(&format!("m{i}"), 300, 100, 0.1, 2))
        .collect();
    build(seeded_config(0.5, seed), machines)
}

/// Build a line, panicking on invalid configuration.
pub fn build(config: LineConfig, machines: Vec<MachineConfig>) -> Line {
    Line::new(config, machines).expect("test line configuration is valid")
}

// ===========================================================================
// Driving
// ===========================================================================

/// Step `line` `ticks` times at its configured tick interval.
pub fn run(line: &mut Line, ticks: u64) {
    let dt = line.config().tick_interval_ms;
    for _ in 0..ticks {
        line.simulation_step(dt);
    }
}

/// Step until `pred` holds or `max_ticks` pass. Returns whether it held.
pub fn run_until(line: &mut Line, max_ticks: u64, mut pred: impl FnMut(&Line) -> bool) -> bool {
    let dt = line.config().tick_interval_ms;
    for _ in 0..max_ticks {
        if pred(line) {
            return true;
        }
        line.simulation_step(dt);
    }
    pred(line)
}

// ===========================================================================
// Invariant checks
// ===========================================================================

/// Assert every structural invariant of a line state.
pub fn assert_line_invariants(line: &Line) {
    assert_eq!(
        line.items_created(),
        line.work_in_progress() + line.finished_count(),
        "item conservation at tick {}",
        line.tick()
    );
    for (i, m) in line.machines().iter().enumerate() {
        assert!(m.buffer_len() <= m.buffer_capacity(), "machine {i} buffer overflow");
        assert!(
            !(m.current_item().is_some() && m.blocked_item().is_some()),
            "machine {i} holds both a current and a blocked item"
        );
        match m.state() {
            MachineState::Processing => assert!(m.current_item().is_some(), "machine {i}"),
            MachineState::BlockedOutput => assert!(m.current_item().is_none(), "machine {i}"),
            MachineState::Idle => {
                assert!(m.current_item().is_none() && m.blocked_item().is_none(), "machine {i}")
            }
            MachineState::Down => {}
        }
        let oee = m.current_oee();
        assert!(oee >= Fixed64::ZERO && oee <= Fixed64::ONE, "machine {i} oee {oee}");
        let metrics = m.metrics();
        assert_eq!(metrics.total_time_ms(), line.global_time(), "machine {i} time accounting");

        for item in m.buffer().iter().chain(m.blocked_item()) {
            assert_history_closed(item);
        }
        if let Some(item) = m.current_item() {
            assert_history_well_formed(item);
            assert!(item.is_at(m.id()), "{} not open at machine {i}", item.id());
        }
    }
    for item in line.finished_goods() {
        assert!(item.completed_at().is_some());
        assert_history_closed(item);
    }
}

/// At most one open entry, and every closed entry ends no earlier than it
/// began.
pub fn assert_history_well_formed(item: &Item) {
    let open = item.history().iter().filter(|e| e.is_open()).count();
    assert!(open <= 1, "{} has {open} open history entries", item.id());
    for entry in item.history() {
        if let Some(exit) = entry.exit_time {
            assert!(exit >= entry.entry_time, "{} exits before entering", item.id());
        }
    }
}

/// Well formed with no open entry: the item is not being worked on.
pub fn assert_history_closed(item: &Item) {
    assert_history_well_formed(item);
    assert!(item.history().iter().all(|e| !e.is_open()), "{} has open history", item.id());
}
