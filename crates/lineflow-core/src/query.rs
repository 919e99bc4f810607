//! Read-only snapshots of line state for presentation consumers.
//!
//! All types are owned copies -- no references into internal line storage --
//! so a renderer can hold them across ticks or ship them elsewhere.

use crate::fixed::{fixed64_to_f64, Fixed64, Millis};
use crate::id::{ItemId, MachineId};
use crate::machine::{Machine, MachineMetrics, MachineState};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Metrics snapshot
// ---------------------------------------------------------------------------

/// Per-machine metrics as exposed to presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub processed_items: u64,
    pub time_processing_ms: Millis,
    pub time_idle_ms: Millis,
    pub time_down_ms: Millis,
    pub time_blocked_ms: Millis,
    pub current_oee: f64,
}

impl MetricsSnapshot {
    fn new(metrics: &MachineMetrics, oee: Fixed64) -> Self {
        Self {
            processed_items: metrics.processed_items,
            time_processing_ms: metrics.time_processing_ms,
            time_idle_ms: metrics.time_idle_ms,
            time_down_ms: metrics.time_down_ms,
            time_blocked_ms: metrics.time_blocked_ms,
            current_oee: fixed64_to_f64(oee),
        }
    }
}

// ---------------------------------------------------------------------------
// Machine snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of one machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSnapshot {
    /// Position in the line.
    pub index: usize,
    pub id: MachineId,
    pub name: String,
    pub state: MachineState,
    /// Buffered items, head first.
    pub buffer: Vec<ItemId>,
    pub buffer_capacity: usize,
    pub current_item: Option<ItemId>,
    pub blocked_item: Option<ItemId>,
    /// Progress on the current item as a 0..1 fraction.
    pub progress: f64,
    pub metrics: MetricsSnapshot,
}

impl MachineSnapshot {
    pub fn of(index: usize, machine: &Machine) -> Self {
        Self {
            index,
            id: machine.id().clone(),
            name: machine.name().to_string(),
            state: machine.state(),
            buffer: machine.buffer().iter().map(|i| i.id()).collect(),
            buffer_capacity: machine.buffer_capacity(),
            current_item: machine.current_item().map(|i| i.id()),
            blocked_item: machine.blocked_item().map(|i| i.id()),
            progress: fixed64_to_f64(machine.progress()),
            metrics: MetricsSnapshot::new(machine.metrics(), machine.current_oee()),
        }
    }
}

// ---------------------------------------------------------------------------
// Line snapshot
// ---------------------------------------------------------------------------

/// One sample of cumulative finished goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistorySample {
    pub time: Millis,
    pub cumulative_count: u64,
}

/// Whole-line view: every machine plus line-level counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSnapshot {
    pub time: Millis,
    pub tick: u64,
    pub machines: Vec<MachineSnapshot>,
    pub items_created: u64,
    pub finished_count: u64,
    pub production_history: Vec<HistorySample>,
}
