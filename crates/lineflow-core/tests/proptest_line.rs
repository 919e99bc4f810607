//! Property-based tests for the line simulation.
//!
//! Generates random machine chains and line parameters, runs them, and checks
//! the structural invariants after every tick.

use lineflow_core::config::{LineConfig, MachineConfig};
use lineflow_core::line::Line;
use lineflow_core::machine::MachineState;
use lineflow_core::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_machine(index: usize) -> impl Strategy<Value = MachineConfig> {
    (
        0u64..1_500,
        0u64..600,
        prop_oneof![Just(0.0), 0.0f64..3.0],
        0u64..2_000,
        0u64..500,
        0usize..4,
    )
        .prop_map(move |(base, var, rate, repair, repair_var, cap)| {
            MachineConfig::new(format!("m{index}"), format!("Machine {index}"), base, cap)
                .with_process_variance(var)
                .with_failures(rate, repair, repair_var)
        })
}

fn arb_machines(max: usize) -> impl Strategy<Value = Vec<MachineConfig>> {
    (0..=max).prop_flat_map(|n| (0..n).map(arb_machine).collect::<Vec<_>>())
}

fn arb_config() -> impl Strategy<Value = LineConfig> {
    (0.0f64..=1.0, 1u64..20, 1usize..50, any::<u64>()).prop_map(
        |(injection_probability, history_sample_interval, history_capacity, seed)| LineConfig {
            injection_probability,
            history_sample_interval,
            history_capacity,
            seed,
            ..LineConfig::default()
        },
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Buffers, slot exclusion, conservation, OEE bounds and time accounting
    /// hold after every tick.
    #[test]
    fn invariants_hold_every_tick(config in arb_config(), machines in arb_machines(6)) {
        let mut line = Line::new(config, machines).unwrap();
        for _ in 0..300 {
            line.simulation_step(100);
            assert_line_invariants(&line);
        }
    }

    /// Two lines from the same configuration stay hash-identical.
    #[test]
    fn deterministic_simulation(config in arb_config(), machines in arb_machines(5)) {
        let mut a = Line::new(config.clone(), machines.clone()).unwrap();
        let mut b = Line::new(config, machines).unwrap();
        for _ in 0..200 {
            a.simulation_step(100);
            b.simulation_step(100);
            prop_assert_eq!(a.state_hash(), b.state_hash());
        }
    }

    /// Production history never exceeds its capacity and is time-ordered
    /// with non-decreasing counts.
    #[test]
    fn history_bounded_and_monotonic(config in arb_config(), machines in arb_machines(4)) {
        let capacity = config.history_capacity;
        let mut line = Line::new(config, machines).unwrap();
        for _ in 0..500 {
            line.simulation_step(100);
        }
        let samples: Vec<_> = line.production_history().copied().collect();
        prop_assert!(samples.len() <= capacity);
        for pair in samples.windows(2) {
            prop_assert!(pair[0].time < pair[1].time);
            prop_assert!(pair[0].cumulative_count <= pair[1].cumulative_count);
        }
    }

    /// Finished items visited every machine exactly once, in line order.
    #[test]
    fn finished_items_visit_every_stage(config in arb_config(), machines in arb_machines(4)) {
        let ids: Vec<_> = machines.iter().map(|m| m.id.clone()).collect();
        let mut line = Line::new(config, machines).unwrap();
        for _ in 0..400 {
            line.simulation_step(100);
        }
        for item in line.finished_goods() {
            let visited: Vec<_> = item.history().iter().map(|e| e.machine.clone()).collect();
            prop_assert_eq!(&visited, &ids);
            let completed = item.completed_at().unwrap();
            prop_assert!(item.history().iter().all(|e| e.exit_time.unwrap() <= completed));
        }
    }

    /// A zero-capacity stage downstream of the head pins the head in
    /// BLOCKED_OUTPUT once it finishes anything.
    #[test]
    fn zero_capacity_stage_blocks_upstream(process_ms in 100u64..800, seed in any::<u64>()) {
        let machines = vec![steady("a", process_ms, 2), steady("b", 100, 0)];
        let mut line = build(seeded_config(1.0, seed), machines);
        for _ in 0..50 {
            line.simulation_step(100);
        }
        let head = line.machine(0).unwrap();
        prop_assert_eq!(head.state(), MachineState::BlockedOutput);
        prop_assert!(head.blocked_item().is_some());
        prop_assert_eq!(line.finished_count(), 0);
    }
}
