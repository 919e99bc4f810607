//! Headless runner: loads a line definition, runs it, prints machine
//! snapshots, and verifies that a second run from the same file is identical.
//!
//! Run with: `cargo run --package lineflow-data --example headless_line [path] [ticks]`
//! Set `RUST_LOG=lineflow_core=debug` to see every state change.

use std::path::PathBuf;

use lineflow_core::fixed::fixed64_to_f64;
use lineflow_data::build_line;
use lineflow_stats::{LineStats, StatsConfig};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_TICKS: u64 = 3_000;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data/three_stage.ron"))
    });
    let ticks = args
        .next()
        .map(|t| t.parse().expect("ticks must be a non-negative integer"))
        .unwrap_or(DEFAULT_TICKS);

    // Run 1
    let mut line = build_line(&path).unwrap_or_else(|e| panic!("failed to build line: {e}"));
    let stats = LineStats::shared(StatsConfig::default(), line.machines().len());
    LineStats::subscribe(&stats, line.events_mut());
    let dt = line.config().tick_interval_ms;
    for _ in 0..ticks {
        line.simulation_step(dt);
        stats.borrow_mut().end_tick(line.tick());
    }
    let hash1 = line.state_hash();
    let snap = line.snapshot();

    println!(
        "After {ticks} ticks ({} ms): {} created, {} finished, {} in progress, state hash = {hash1:#018x}",
        snap.time,
        snap.items_created,
        snap.finished_count,
        line.work_in_progress()
    );
    for (machine, m) in line.machines().iter().zip(&snap.machines) {
        println!(
            "  [{:>6}] state={:?}, buffer={}/{}, progress={:.2}, processed={}, breakdowns={}, oee={:.3}",
            m.id,
            m.state,
            m.buffer.len(),
            m.buffer_capacity,
            m.progress,
            m.metrics.processed_items,
            machine.metrics().breakdowns,
            fixed64_to_f64(machine.current_oee()),
        );
    }
    if let Some(last) = snap.production_history.last() {
        println!(
            "  history: {} samples, last = {} at {} ms",
            snap.production_history.len(),
            last.cumulative_count,
            last.time
        );
    }
    let stats = stats.borrow();
    println!(
        "  throughput = {:.3} items/tick, bottleneck = {:?}",
        fixed64_to_f64(stats.throughput()),
        stats.bottleneck().map(|i| snap.machines[i].id.as_str())
    );

    // Run 2 -- determinism check
    let mut line2 =
        build_line(&path).unwrap_or_else(|e| panic!("failed to build line (run 2): {e}"));
    for _ in 0..ticks {
        line2.simulation_step(dt);
    }
    let hash2 = line2.state_hash();

    if hash1 == hash2 {
        println!("Determinism: PASS (hashes match)");
    } else {
        println!("Determinism: FAIL! hash1={hash1:#018x} != hash2={hash2:#018x}");
        std::process::exit(1);
    }
}
