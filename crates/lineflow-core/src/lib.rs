//! Lineflow Core -- a discrete-time simulation of a serial production line.
//!
//! A [`line::Line`] is an ordered chain of [`machine::Machine`]s. Each machine
//! has a bounded FIFO input buffer, processes one item at a time with a
//! randomized duration, may break down and be repaired, and blocks when the
//! next stage cannot accept its finished item. Items carry their own
//! traceability history; per-machine metrics feed an OEE figure.
//!
//! # Tick Pipeline
//!
//! Each call to [`line::Line::simulation_step`] advances the line by one tick:
//!
//! 1. **Clock** -- advance simulated time by the step duration.
//! 2. **Injection** -- maybe admit a new item at the head machine.
//! 3. **Sweep** -- tail to head, retry blocked hand-offs, then update each
//!    machine and route what it finished.
//! 4. **History** -- periodically sample cumulative finished goods.
//! 5. **Delivery** -- deliver buffered events to passive listeners.
//!
//! # Key Types
//!
//! - [`line::Line`] -- Coordinator and owner of all machines.
//! - [`machine::Machine`] -- State machine, buffer and metrics for one station.
//! - [`item::Item`] -- A work item and its per-machine history.
//! - [`config::LineConfig`] / [`config::MachineConfig`] -- Validated parameters.
//! - [`rng::RandomSource`] -- Injected randomness; [`rng::SimRng`] by default.
//! - [`event::EventBus`] -- Typed events with buffered delivery.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for ratios and OEE.

pub mod config;
pub mod event;
pub mod fixed;
pub mod id;
pub mod item;
pub mod line;
pub mod machine;
pub mod query;
pub mod rng;
pub mod sim;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
