#![no_main]
use arbitrary::Arbitrary;
use lineflow_core::config::{LineConfig, MachineConfig};
use lineflow_core::line::Line;
use lineflow_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

/// One machine, with every field narrowed to a range that keeps runs short.
#[derive(Arbitrary, Debug)]
struct FuzzMachine {
    process_ms: u16,
    variance_ms: u16,
    failure_per_mille: u16,
    repair_ms: u16,
    repair_variance_ms: u16,
    capacity: u8,
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Inject,
    Step { dt: u16 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    seed: u64,
    injection_per_mille: u16,
    machines: Vec<FuzzMachine>,
    ops: Vec<FuzzOp>,
}

fuzz_target!(|input: FuzzInput| {
    let machines: Vec<MachineConfig> = input
        .machines
        .iter()
        .take(16)
        .enumerate()
        .map(|(i, m)| {
            MachineConfig::new(
                format!("m{i}"),
                format!("M{i}"),
                m.process_ms as u64,
                (m.capacity % 8) as usize,
            )
                .with_process_variance(m.variance_ms as u64)
                .with_failures(
                    (m.failure_per_mille % 5_000) as f64 / 1000.0,
                    m.repair_ms as u64,
                    m.repair_variance_ms as u64,
                )
        })
        .collect();
    let config = LineConfig {
        injection_probability: (input.injection_per_mille % 1_001) as f64 / 1000.0,
        seed: input.seed,
        ..LineConfig::default()
    };
    let Ok(mut line) = Line::new(config, machines) else {
        return;
    };

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(500);

    for op in &input.ops[..max_ops] {
        match op {
            FuzzOp::Inject => {
                let _ = line.inject_item();
            }
            FuzzOp::Step { dt } => line.simulation_step(*dt as u64),
        }
        assert_line_invariants(&line);
    }
});
