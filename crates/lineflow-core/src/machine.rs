use crate::config::{ConfigError, MachineConfig};
use crate::fixed::{ratio, Fixed64, Millis};
use crate::id::MachineId;
use crate::item::Item;
use crate::rng::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

// ---------------------------------------------------------------------------
// Machine state
// ---------------------------------------------------------------------------

/// Lifecycle state of a machine. There is no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    #[default]
    Idle,
    Processing,
    Down,
    /// Holding a finished item that the next stage could not accept.
    BlockedOutput,
}

impl MachineState {
    /// Stable discriminant for hashing and array lookups.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionCause {
    Started,
    Finished,
    BrokeDown,
    Repaired,
    Blocked,
    Unblocked,
}

/// A single recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: MachineState,
    pub to: MachineState,
    pub cause: TransitionCause,
    pub time: Millis,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Cumulative per-machine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineMetrics {
    /// Items successfully handed off downstream.
    pub processed_items: u64,
    pub time_processing_ms: Millis,
    pub time_idle_ms: Millis,
    pub time_down_ms: Millis,
    pub time_blocked_ms: Millis,
    pub breakdowns: u64,
}

impl MachineMetrics {
    pub fn total_time_ms(&self) -> Millis {
        self.time_processing_ms
            .saturating_add(self.time_idle_ms)
            .saturating_add(self.time_down_ms)
            .saturating_add(self.time_blocked_ms)
    }
}

/// The three OEE factors and their product, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OeeBreakdown {
    pub availability: Fixed64,
    pub performance: Fixed64,
    pub quality: Fixed64,
    pub oee: Fixed64,
}

impl OeeBreakdown {
    /// Recompute from cumulative metrics.
    ///
    /// Availability is the non-down share of total time (1 before any time
    /// has elapsed). Performance compares ideal to actual processing time: 1
    /// when nothing has been processed in zero time, 0 when only one of the
    /// two is zero. Quality is always 1 since scrap is not modeled.
    pub fn compute(metrics: &MachineMetrics, ideal_cycle_ms: Millis) -> Self {
        let total = metrics.total_time_ms();
        let availability = if total == 0 {
            Fixed64::ONE
        } else {
            ratio((total - metrics.time_down_ms) as u128, total as u128)
        };

        let processing = metrics.time_processing_ms;
        let count = metrics.processed_items;
        let performance = match (processing, count) {
            (0, 0) => Fixed64::ONE,
            (0, _) | (_, 0) => Fixed64::ZERO,
            _ => ratio(ideal_cycle_ms as u128 * count as u128, processing as u128),
        };

        let quality = Fixed64::ONE;
        Self {
            availability,
            performance,
            quality,
            oee: availability * performance * quality,
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// One station of the line: a bounded FIFO input buffer, a state machine and
/// its metrics.
///
/// `current_item` and `blocked_item` are never both set. Routing of finished
/// items is the caller's job: [`update`](Self::update) hands them back.
#[derive(Debug, Clone)]
pub struct Machine {
    config: MachineConfig,
    failure_probability: Fixed64,

    state: MachineState,
    buffer: VecDeque<Item>,
    current_item: Option<Item>,
    blocked_item: Option<Item>,

    /// Elapsed time in the current state.
    time_in_state: Millis,
    /// Processing time accumulated on the current item. Survives breakdowns.
    progress: Millis,
    process_target: Millis,
    repair_target: Millis,

    metrics: MachineMetrics,
    oee: OeeBreakdown,

    transitions: Vec<StateTransition>,
}

impl Machine {
    /// Build a machine. `tick_interval_ms` converts the configured per-second
    /// failure rate into a per-tick probability.
    pub fn new(config: MachineConfig, tick_interval_ms: Millis) -> Result<Self, ConfigError> {
        config.validate(0)?;
        let failure_probability = config.failure_probability_per_tick(tick_interval_ms);
        let metrics = MachineMetrics::default();
        let oee = OeeBreakdown::compute(&metrics, config.process_time_base_ms);
        Ok(Self {
            buffer: VecDeque::with_capacity(config.buffer_capacity),
            config,
            failure_probability,
            state: MachineState::Idle,
            current_item: None,
            blocked_item: None,
            time_in_state: 0,
            progress: 0,
            process_target: 0,
            repair_target: 0,
            metrics,
            oee,
            transitions: Vec::new(),
        })
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> &MachineId {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn buffer(&self) -> &VecDeque<Item> {
        &self.buffer
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.config.buffer_capacity
    }

    pub fn has_buffer_space(&self) -> bool {
        self.buffer.len() < self.config.buffer_capacity
    }

    pub fn current_item(&self) -> Option<&Item> {
        self.current_item.as_ref()
    }

    pub fn blocked_item(&self) -> Option<&Item> {
        self.blocked_item.as_ref()
    }

    pub fn time_in_state(&self) -> Millis {
        self.time_in_state
    }

    pub fn metrics(&self) -> &MachineMetrics {
        &self.metrics
    }

    pub fn oee(&self) -> &OeeBreakdown {
        &self.oee
    }

    pub fn current_oee(&self) -> Fixed64 {
        self.oee.oee
    }

    /// Processing progress on the held item as a 0..1 fraction.
    pub fn progress(&self) -> Fixed64 {
        if self.current_item.is_none() {
            return Fixed64::ZERO;
        }
        if self.process_target == 0 {
            return Fixed64::ONE;
        }
        ratio(self.progress as u128, self.process_target as u128)
    }

    /// Number of items held anywhere in this machine.
    pub fn item_count(&self) -> usize {
        self.buffer.len()
            + usize::from(self.current_item.is_some())
            + usize::from(self.blocked_item.is_some())
    }

    /// Take the transitions recorded since the last drain.
    pub fn drain_transitions(&mut self) -> Vec<StateTransition> {
        std::mem::take(&mut self.transitions)
    }

    // -- Flow control -------------------------------------------------------

    /// Append `item` to the input buffer if there is room.
    ///
    /// A full buffer is the backpressure signal, not an error: the item is
    /// handed back untouched.
    pub fn try_add_item_to_buffer(&mut self, item: Item) -> Result<(), Item> {
        if !self.has_buffer_space() {
            return Err(item);
        }
        self.buffer.push_back(item);
        Ok(())
    }

    /// Dequeue the head of the buffer and start working on it.
    ///
    /// No-op (returns `false`) unless the machine is idle, holds nothing, and
    /// has buffered input.
    pub fn start_processing<R: RandomSource + ?Sized>(&mut self, now: Millis, rng: &mut R) -> bool {
        if self.state != MachineState::Idle
            || self.current_item.is_some()
            || self.blocked_item.is_some()
        {
            return false;
        }
        let Some(mut item) = self.buffer.pop_front() else {
            return false;
        };
        item.enter(&self.config.id, now);
        self.current_item = Some(item);
        self.progress = 0;
        self.process_target = rng.draw_duration(
            self.config.process_time_base_ms,
            self.config.process_time_variance_ms,
        );
        self.transition(MachineState::Processing, TransitionCause::Started, now);
        true
    }

    /// Advance the machine by one tick of `dt` ending at `now`.
    ///
    /// Returns the item finished this tick, if any. The caller decides where
    /// it goes and either credits the hand-off or blocks the machine.
    ///
    /// Completion compares the processing time accumulated on the held item
    /// against its drawn target. That progress carries across a breakdown,
    /// so a repaired machine finishes the remaining work rather than starting
    /// the item over. Elapsed-in-state still resets on every transition and
    /// drives the repair check.
    pub fn update<R: RandomSource + ?Sized>(
        &mut self,
        dt: Millis,
        now: Millis,
        rng: &mut R,
    ) -> Option<Item> {
        if self.state == MachineState::Idle {
            self.start_processing(now, rng);
        }

        self.time_in_state = self.time_in_state.saturating_add(dt);
        let mut finished = None;

        match self.state {
            MachineState::Idle => add_time(&mut self.metrics.time_idle_ms, dt),
            MachineState::Processing => {
                add_time(&mut self.metrics.time_processing_ms, dt);
                add_time(&mut self.progress, dt);
                if self.progress >= self.process_target {
                    finished = self.finish(now);
                } else if rng.chance(self.failure_probability) {
                    self.break_down(now, rng);
                }
            }
            MachineState::Down => {
                add_time(&mut self.metrics.time_down_ms, dt);
                if self.time_in_state >= self.repair_target {
                    self.resume(now, rng);
                }
            }
            MachineState::BlockedOutput => add_time(&mut self.metrics.time_blocked_ms, dt),
        }

        self.recompute_oee();
        finished
    }

    /// Hold a finished item that could not be handed off.
    ///
    /// Refused (item handed back) if the machine still holds any item.
    pub fn block_output(&mut self, item: Item, now: Millis) -> Result<(), Item> {
        if self.current_item.is_some() || self.blocked_item.is_some() {
            return Err(item);
        }
        self.hold_blocked(item, now);
        Ok(())
    }

    /// Block on an item the line just took out of this machine. The line only
    /// calls this right after `update` or `clear_blocked_output` emptied both
    /// slots.
    pub(crate) fn hold_blocked(&mut self, item: Item, now: Millis) {
        debug_assert!(self.current_item.is_none() && self.blocked_item.is_none());
        self.blocked_item = Some(item);
        self.transition(MachineState::BlockedOutput, TransitionCause::Blocked, now);
    }

    /// Leave `BLOCKED_OUTPUT` for `IDLE`, releasing the held item.
    ///
    /// The released item counts as processed. A blocked machine without an
    /// item clears itself and releases nothing. Outside `BLOCKED_OUTPUT` this
    /// is a no-op.
    pub fn clear_blocked_output(&mut self, now: Millis) -> Option<Item> {
        if self.state != MachineState::BlockedOutput {
            return None;
        }
        let item = self.blocked_item.take();
        if item.is_some() {
            self.credit_processed();
        }
        self.transition(MachineState::Idle, TransitionCause::Unblocked, now);
        item
    }

    /// Count one successful hand-off.
    pub fn credit_processed(&mut self) {
        self.metrics.processed_items += 1;
        self.recompute_oee();
    }

    // -- Internals ----------------------------------------------------------

    fn finish(&mut self, now: Millis) -> Option<Item> {
        let mut item = self.current_item.take()?;
        item.exit(&self.config.id, now);
        self.progress = 0;
        self.transition(MachineState::Idle, TransitionCause::Finished, now);
        Some(item)
    }

    fn break_down<R: RandomSource + ?Sized>(&mut self, now: Millis, rng: &mut R) {
        self.repair_target =
            rng.draw_duration(self.config.repair_time_base_ms, self.config.repair_time_variance_ms);
        self.metrics.breakdowns += 1;
        self.transition(MachineState::Down, TransitionCause::BrokeDown, now);
    }

    fn resume<R: RandomSource + ?Sized>(&mut self, now: Millis, rng: &mut R) {
        if self.blocked_item.is_some() {
            self.transition(MachineState::BlockedOutput, TransitionCause::Repaired, now);
        } else if self.current_item.is_some() {
            self.transition(MachineState::Processing, TransitionCause::Repaired, now);
        } else {
            self.transition(MachineState::Idle, TransitionCause::Repaired, now);
            self.start_processing(now, rng);
        }
    }

    fn transition(&mut self, to: MachineState, cause: TransitionCause, now: Millis) {
        let from = self.state;
        self.state = to;
        self.time_in_state = 0;
        debug!(machine = %self.config.id, ?from, ?to, ?cause, time = now, "machine state change");
        self.transitions.push(StateTransition {
            from,
            to,
            cause,
            time: now,
        });
    }

    fn recompute_oee(&mut self) {
        self.oee = OeeBreakdown::compute(&self.metrics, self.config.process_time_base_ms);
    }
}

/// Time counters saturate like the line clock.
fn add_time(counter: &mut Millis, dt: Millis) {
    *counter = counter.saturating_add(dt);
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ItemId;
    use crate::rng::SimRng;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn steady(process_ms: Millis, capacity: usize) -> Machine {
        Machine::new(MachineConfig::new("m", "Mill", process_ms, capacity), 100).unwrap()
    }

    /// Breaks down on every processing tick that does not finish.
    fn fragile(process_ms: Millis, repair_ms: Millis) -> Machine {
        let config =
            MachineConfig::new("f", "Fragile", process_ms, 2).with_failures(10.0, repair_ms, 0);
        Machine::new(config, 100).unwrap()
    }

    fn item(n: u64) -> Item {
        Item::new(ItemId(n), 0)
    }

    #[test]
    fn starts_idle_with_empty_slots() {
        let m = steady(1000, 1);
        assert_eq!(m.state(), MachineState::Idle);
        assert!(m.current_item().is_none());
        assert!(m.blocked_item().is_none());
        assert_eq!(m.buffer_len(), 0);
        assert_eq!(m.current_oee(), Fixed64::ONE);
    }

    #[test]
    fn buffer_admission_respects_capacity() {
        let mut m = steady(1000, 1);
        assert!(m.try_add_item_to_buffer(item(1)).is_ok());
        let rejected = m.try_add_item_to_buffer(item(2)).unwrap_err();
        assert_eq!(rejected.id(), ItemId(2));
        assert_eq!(m.buffer_len(), 1);
    }

    #[test]
    fn zero_capacity_never_admits() {
        let mut m = steady(1000, 0);
        assert!(m.try_add_item_to_buffer(item(1)).is_err());
        assert!(!m.has_buffer_space());
    }

    #[test]
    fn start_processing_noop_on_empty_buffer() {
        let mut m = steady(1000, 1);
        let mut rng = SimRng::new(1);
        assert!(!m.start_processing(0, &mut rng));
        assert_eq!(m.state(), MachineState::Idle);
    }

    #[test]
    fn start_processing_noop_when_holding_item() {
        let mut m = steady(1000, 2);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();
        m.try_add_item_to_buffer(item(2)).unwrap();
        assert!(m.start_processing(0, &mut rng));
        assert!(!m.start_processing(0, &mut rng));
        assert_eq!(m.current_item().unwrap().id(), ItemId(1));
        assert_eq!(m.buffer_len(), 1);
    }

    #[test]
    fn processes_for_exact_duration() {
        // 1000 ms at 100 ms ticks: processing ticks 1..=9, finish on tick 10.
        let mut m = steady(1000, 1);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();

        for t in 1..10u64 {
            assert!(m.update(100, t * 100, &mut rng).is_none());
            assert_eq!(m.state(), MachineState::Processing, "tick {t}");
        }
        let done = m.update(100, 1000, &mut rng).expect("finishes on tick 10");
        assert_eq!(done.id(), ItemId(1));
        assert_eq!(m.state(), MachineState::Idle);
        assert!(m.current_item().is_none());

        let visit = &done.history()[0];
        assert_eq!(visit.entry_time, 100);
        assert_eq!(visit.exit_time, Some(1000));
        assert_eq!(m.metrics().time_processing_ms, 1000);
    }

    #[test]
    fn idle_time_accumulates_without_input() {
        let mut m = steady(1000, 1);
        let mut rng = SimRng::new(1);
        for t in 1..=5 {
            m.update(100, t * 100, &mut rng);
        }
        assert_eq!(m.metrics().time_idle_ms, 500);
        assert_eq!(m.metrics().total_time_ms(), 500);
    }

    #[test]
    fn zero_failure_rate_never_breaks() {
        let mut m = steady(10_000, 1);
        let mut rng = SimRng::new(77);
        m.try_add_item_to_buffer(item(1)).unwrap();
        for t in 1..99 {
            m.update(100, t * 100, &mut rng);
            assert_ne!(m.state(), MachineState::Down);
        }
    }

    #[test]
    fn breakdown_then_resume_preserves_item() {
        let mut m = fragile(200, 300);
        let mut rng = SimRng::new(5);
        m.try_add_item_to_buffer(item(9)).unwrap();

        // Tick 1: starts, processes 100 ms, breaks down.
        m.update(100, 100, &mut rng);
        assert_eq!(m.state(), MachineState::Down);
        assert_eq!(m.current_item().unwrap().id(), ItemId(9));
        assert_eq!(m.metrics().breakdowns, 1);

        // Repair takes 300 ms.
        m.update(100, 200, &mut rng);
        m.update(100, 300, &mut rng);
        assert_eq!(m.state(), MachineState::Down);
        m.update(100, 400, &mut rng);
        assert_eq!(m.state(), MachineState::Processing);
        assert_eq!(m.current_item().unwrap().id(), ItemId(9));
        assert_eq!(m.metrics().time_down_ms, 300);
        // Progress made before the breakdown is kept.
        assert_eq!(m.progress(), fixed(0.5));
    }

    #[test]
    fn idle_machine_never_rolls_failure() {
        let mut m = fragile(1000, 300);
        let mut rng = SimRng::new(5);
        for t in 1..=20 {
            m.update(100, t * 100, &mut rng);
        }
        assert_eq!(m.state(), MachineState::Idle);
        assert_eq!(m.metrics().breakdowns, 0);
    }

    #[test]
    fn block_and_clear_output() {
        let mut m = steady(100, 1);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();
        let done = m.update(100, 100, &mut rng).unwrap();

        m.block_output(done, 100).unwrap();
        assert_eq!(m.state(), MachineState::BlockedOutput);
        assert!(m.current_item().is_none());

        m.update(100, 200, &mut rng);
        m.update(100, 300, &mut rng);
        assert_eq!(m.state(), MachineState::BlockedOutput);
        assert_eq!(m.metrics().time_blocked_ms, 200);

        let released = m.clear_blocked_output(300).unwrap();
        assert_eq!(released.id(), ItemId(1));
        assert_eq!(m.state(), MachineState::Idle);
        assert_eq!(m.metrics().processed_items, 1);
    }

    #[test]
    fn blocked_machine_does_not_start_next_item() {
        let mut m = steady(100, 2);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();
        m.try_add_item_to_buffer(item(2)).unwrap();
        let done = m.update(100, 100, &mut rng).unwrap();
        m.block_output(done, 100).unwrap();

        m.update(100, 200, &mut rng);
        assert_eq!(m.state(), MachineState::BlockedOutput);
        assert_eq!(m.buffer_len(), 1);
    }

    #[test]
    fn block_output_refused_while_processing() {
        let mut m = steady(1000, 2);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();
        m.update(100, 100, &mut rng);
        let back = m.block_output(item(2), 100).unwrap_err();
        assert_eq!(back.id(), ItemId(2));
        assert_eq!(m.state(), MachineState::Processing);
    }

    #[test]
    fn clear_outside_blocked_is_noop() {
        let mut m = steady(1000, 1);
        assert!(m.clear_blocked_output(0).is_none());
        assert_eq!(m.state(), MachineState::Idle);
        assert_eq!(m.metrics().processed_items, 0);
    }

    #[test]
    fn transitions_are_recorded_in_order() {
        let mut m = steady(200, 1);
        let mut rng = SimRng::new(1);
        m.try_add_item_to_buffer(item(1)).unwrap();
        m.update(100, 100, &mut rng);
        m.update(100, 200, &mut rng);

        let causes: Vec<_> = m.drain_transitions().iter().map(|t| t.cause).collect();
        assert_eq!(causes, vec![TransitionCause::Started, TransitionCause::Finished]);
        assert!(m.drain_transitions().is_empty());
    }

    // -- OEE --------------------------------------------------------------

    #[test]
    fn oee_convention_for_no_work() {
        let metrics = MachineMetrics::default();
        let oee = OeeBreakdown::compute(&metrics, 1000);
        assert_eq!(oee.performance, Fixed64::ONE);
        assert_eq!(oee.availability, Fixed64::ONE);
    }

    #[test]
    fn oee_zero_when_only_one_performance_term_is_zero() {
        let busy_no_output = MachineMetrics {
            time_processing_ms: 500,
            ..Default::default()
        };
        assert_eq!(OeeBreakdown::compute(&busy_no_output, 1000).performance, Fixed64::ZERO);

        let output_no_time = MachineMetrics {
            processed_items: 2,
            time_idle_ms: 500,
            ..Default::default()
        };
        assert_eq!(OeeBreakdown::compute(&output_no_time, 1000).oee, Fixed64::ZERO);
    }

    #[test]
    fn oee_combines_availability_and_performance() {
        let metrics = MachineMetrics {
            processed_items: 1,
            time_processing_ms: 2000,
            time_idle_ms: 1000,
            time_down_ms: 1000,
            time_blocked_ms: 0,
            breakdowns: 1,
        };
        let oee = OeeBreakdown::compute(&metrics, 1000);
        assert_eq!(oee.availability, fixed(0.75));
        assert_eq!(oee.performance, fixed(0.5));
        assert_eq!(oee.quality, Fixed64::ONE);
        assert_eq!(oee.oee, fixed(0.375));
    }

    #[test]
    fn time_counters_saturate_on_huge_steps() {
        let mut m = steady(1000, 1);
        let mut rng = SimRng::new(1);
        m.update(u64::MAX, u64::MAX, &mut rng);
        m.update(u64::MAX, u64::MAX, &mut rng);
        assert_eq!(m.metrics().time_idle_ms, u64::MAX);
        assert_eq!(m.metrics().total_time_ms(), u64::MAX);
        assert_eq!(m.time_in_state(), u64::MAX);

        m.try_add_item_to_buffer(item(1)).unwrap();
        let done = m.update(u64::MAX, u64::MAX, &mut rng).unwrap();
        assert_eq!(done.id(), ItemId(1));
        assert_eq!(m.metrics().time_processing_ms, u64::MAX);
        assert_eq!(m.metrics().total_time_ms(), u64::MAX);
        let oee = m.current_oee();
        assert!(oee >= Fixed64::ZERO && oee <= Fixed64::ONE);
    }

    #[test]
    fn performance_capped_at_one() {
        let metrics = MachineMetrics {
            processed_items: 10,
            time_processing_ms: 1000,
            ..Default::default()
        };
        assert_eq!(OeeBreakdown::compute(&metrics, 1000).performance, Fixed64::ONE);
    }
}
