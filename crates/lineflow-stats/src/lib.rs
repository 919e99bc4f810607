//! Rolling production statistics for a Lineflow line.
//!
//! Tracks per-machine state shares, breakdown counts, MTBF/MTTR and output
//! rate, plus line-level throughput, over a configurable window of ticks.
//! Listens to core events (`StateChanged`, `ItemHandedOff`, `ItemFinished`)
//! and aggregates them with [`Fixed64`] arithmetic.
//!
//! # Usage
//!
//! ```ignore
//! let stats = LineStats::shared(StatsConfig::default(), line.machines().len());
//! LineStats::subscribe(&stats, line.events_mut());
//! loop {
//!     line.simulation_step(100);
//!     stats.borrow_mut().end_tick(line.tick());
//! }
//! let slowest = stats.borrow().bottleneck();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lineflow_core::event::{Event, EventBus, EventKind};
use lineflow_core::fixed::{ratio, Fixed64, Millis};
use lineflow_core::machine::{MachineState, TransitionCause};

const STATE_COUNT: usize = 4;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the statistics module.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Window size in ticks for rolling shares and rates.
    pub window_size: usize,
    /// Maximum number of throughput samples to retain.
    pub history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_size: 600,
            history_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity history of samples. When full, the oldest sample is
/// dropped. Iterates oldest to newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T = Fixed64> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<T> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ---------------------------------------------------------------------------
// Rolling window counter
// ---------------------------------------------------------------------------

/// Per-tick counts over the most recent N committed ticks.
///
/// Call [`add`](Self::add) during a tick and [`commit`](Self::commit) exactly
/// once at its end. `total` includes the in-progress tick; `rate` covers
/// committed ticks only.
#[derive(Debug, Clone)]
struct RollingWindow {
    ticks: VecDeque<u64>,
    window_size: usize,
    committed_total: u64,
    current: u64,
}

impl RollingWindow {
    fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            ticks: VecDeque::with_capacity(window_size),
            window_size,
            committed_total: 0,
            current: 0,
        }
    }

    fn add(&mut self, count: u64) {
        self.current += count;
    }

    fn commit(&mut self) {
        if self.ticks.len() == self.window_size
            && let Some(evicted) = self.ticks.pop_front()
        {
            self.committed_total -= evicted;
        }
        self.ticks.push_back(self.current);
        self.committed_total += self.current;
        self.current = 0;
    }

    fn total(&self) -> u64 {
        self.committed_total + self.current
    }

    /// Mean count per committed tick. Zero before the first commit.
    fn rate(&self) -> Fixed64 {
        if self.ticks.is_empty() {
            return Fixed64::ZERO;
        }
        Fixed64::saturating_from_num(self.committed_total)
            / Fixed64::saturating_from_num(self.ticks.len())
    }

    fn clear(&mut self) {
        self.ticks.clear();
        self.committed_total = 0;
        self.current = 0;
    }
}

// ---------------------------------------------------------------------------
// Per-machine statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MachineStats {
    /// Last state reported by a transition.
    state: MachineState,
    /// State the machine worked in this tick, fixed by its first transition.
    tick_state: Option<MachineState>,
    /// Ticks spent in each state, indexed by `MachineState::index`.
    state_ticks: [RollingWindow; STATE_COUNT],
    /// Items handed off downstream or into finished goods.
    output: RollingWindow,
    breakdowns: u64,
    repairs: u64,
    processing_ticks_total: u64,
    down_ticks_total: u64,
}

impl MachineStats {
    fn new(window_size: usize) -> Self {
        Self {
            state: MachineState::Idle,
            tick_state: None,
            state_ticks: std::array::from_fn(|_| RollingWindow::new(window_size)),
            output: RollingWindow::new(window_size),
            breakdowns: 0,
            repairs: 0,
            processing_ticks_total: 0,
            down_ticks_total: 0,
        }
    }

    /// A tick is attributed to the state the machine did its work in. A
    /// release from BLOCKED_OUTPUT happens before the machine's own update
    /// and does not decide it; a start from IDLE counts as processing.
    fn record_transition(&mut self, from: MachineState, to: MachineState, cause: TransitionCause) {
        if self.tick_state.is_none() {
            match cause {
                TransitionCause::Unblocked => {}
                TransitionCause::Started => self.tick_state = Some(to),
                _ => self.tick_state = Some(from),
            }
        }
        match cause {
            TransitionCause::BrokeDown => self.breakdowns += 1,
            TransitionCause::Repaired => self.repairs += 1,
            _ => {}
        }
        self.state = to;
    }

    fn end_tick(&mut self) {
        let worked_in = self.tick_state.take().unwrap_or(self.state);
        self.state_ticks[worked_in.index()].add(1);
        match worked_in {
            MachineState::Processing => self.processing_ticks_total += 1,
            MachineState::Down => self.down_ticks_total += 1,
            _ => {}
        }
        for window in &mut self.state_ticks {
            window.commit();
        }
        self.output.commit();
    }

    fn tracked_ticks(&self) -> u64 {
        self.state_ticks.iter().map(RollingWindow::total).sum()
    }

    fn share(&self, state: MachineState) -> Fixed64 {
        ratio(
            self.state_ticks[state.index()].total() as u128,
            self.tracked_ticks() as u128,
        )
    }

    fn mtbf(&self) -> Option<Fixed64> {
        mean(self.processing_ticks_total, self.breakdowns)
    }

    fn mttr(&self) -> Option<Fixed64> {
        mean(self.down_ticks_total, self.repairs)
    }
}

fn mean(total: u64, count: u64) -> Option<Fixed64> {
    (count > 0).then(|| Fixed64::saturating_from_num(total) / Fixed64::saturating_from_num(count))
}

// ---------------------------------------------------------------------------
// LineStats
// ---------------------------------------------------------------------------

/// Line statistics aggregator.
///
/// Accepts events via [`process_event`](LineStats::process_event), advances
/// time via [`end_tick`](LineStats::end_tick), and exposes per-machine and
/// line-level metrics through getters. Machines are referred to by their
/// index in line order; unknown indices read as zero / `None`.
#[derive(Debug)]
pub struct LineStats {
    config: StatsConfig,
    machines: Vec<MachineStats>,
    throughput: RollingWindow,
    throughput_history: RingBuffer,
    finished_total: u64,
    lead_time_total: u128,
    current_tick: u64,
}

impl LineStats {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            throughput: RollingWindow::new(config.window_size),
            throughput_history: RingBuffer::new(config.history_capacity),
            config,
            machines: Vec::new(),
            finished_total: 0,
            lead_time_total: 0,
            current_tick: 0,
        }
    }

    /// Pre-size for a line of `machine_count` machines so that machines
    /// which never emit an event are still tracked as idle.
    pub fn with_machine_count(mut self, machine_count: usize) -> Self {
        if machine_count > 0 {
            self.ensure_machine(machine_count - 1);
        }
        self
    }

    /// Shared handle for use from event listeners.
    pub fn shared(config: StatsConfig, machine_count: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(config).with_machine_count(machine_count)))
    }

    /// Register passive listeners on `bus` that feed `stats`.
    ///
    /// The caller still calls [`end_tick`](Self::end_tick) after every
    /// simulation step.
    pub fn subscribe(stats: &Rc<RefCell<Self>>, bus: &mut EventBus) {
        for kind in [
            EventKind::StateChanged,
            EventKind::ItemHandedOff,
            EventKind::ItemFinished,
        ] {
            let stats = Rc::clone(stats);
            bus.on_passive(kind, Box::new(move |event| stats.borrow_mut().process_event(event)));
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    // -- Event processing ---------------------------------------------------

    /// Process a single event, updating internal counters.
    pub fn process_event(&mut self, event: &Event) {
        match event {
            Event::StateChanged {
                machine,
                from,
                to,
                cause,
                ..
            } => {
                self.ensure_machine(*machine)
                    .record_transition(*from, *to, *cause);
            }

            Event::ItemHandedOff { from, .. } => {
                self.ensure_machine(*from).output.add(1);
            }

            Event::ItemFinished {
                machine, lead_time, ..
            } => {
                self.ensure_machine(*machine).output.add(1);
                self.throughput.add(1);
                self.finished_total += 1;
                self.lead_time_total += *lead_time as u128;
            }

            // Other events are not tracked by the stats module.
            _ => {}
        }
    }

    /// Finalize the current tick and advance all rolling windows.
    ///
    /// Must be called once per tick after the tick's events were processed.
    pub fn end_tick(&mut self, tick: u64) {
        self.current_tick = tick;
        for machine in &mut self.machines {
            machine.end_tick();
        }
        self.throughput.commit();
        self.throughput_history.push(self.throughput.rate());
    }

    // -- Per-machine queries ------------------------------------------------

    /// Share of windowed ticks spent in `state` (0 to 1).
    pub fn state_share(&self, machine: usize, state: MachineState) -> Fixed64 {
        self.machines
            .get(machine)
            .map(|m| m.share(state))
            .unwrap_or(Fixed64::ZERO)
    }

    /// Processing share of the window.
    pub fn utilization(&self, machine: usize) -> Fixed64 {
        self.state_share(machine, MachineState::Processing)
    }

    pub fn idle_ratio(&self, machine: usize) -> Fixed64 {
        self.state_share(machine, MachineState::Idle)
    }

    pub fn down_ratio(&self, machine: usize) -> Fixed64 {
        self.state_share(machine, MachineState::Down)
    }

    pub fn blocked_ratio(&self, machine: usize) -> Fixed64 {
        self.state_share(machine, MachineState::BlockedOutput)
    }

    /// Items per tick leaving this machine, over the window.
    pub fn output_rate(&self, machine: usize) -> Fixed64 {
        self.machines
            .get(machine)
            .map(|m| m.output.rate())
            .unwrap_or(Fixed64::ZERO)
    }

    /// Breakdowns since tracking began.
    pub fn breakdowns(&self, machine: usize) -> u64 {
        self.machines.get(machine).map_or(0, |m| m.breakdowns)
    }

    /// Mean processing ticks between breakdowns. `None` before the first
    /// breakdown.
    pub fn mtbf_ticks(&self, machine: usize) -> Option<Fixed64> {
        self.machines.get(machine).and_then(MachineStats::mtbf)
    }

    /// Mean down ticks per completed repair. `None` before the first repair.
    pub fn mttr_ticks(&self, machine: usize) -> Option<Fixed64> {
        self.machines.get(machine).and_then(MachineStats::mttr)
    }

    // -- Line queries -------------------------------------------------------

    /// Finished items per tick over the window.
    pub fn throughput(&self) -> Fixed64 {
        self.throughput.rate()
    }

    /// Throughput sampled at every `end_tick`, oldest to newest.
    pub fn throughput_history(&self) -> Vec<Fixed64> {
        self.throughput_history.to_vec()
    }

    pub fn finished_total(&self) -> u64 {
        self.finished_total
    }

    /// Mean creation-to-completion time of finished items.
    pub fn mean_lead_time(&self) -> Option<Millis> {
        (self.finished_total > 0)
            .then(|| (self.lead_time_total / self.finished_total as u128) as Millis)
    }

    /// The machine with the highest processing share in the window. Ties go
    /// to the machine nearest the head. `None` before any tick is tracked.
    pub fn bottleneck(&self) -> Option<usize> {
        let mut best: Option<(usize, Fixed64)> = None;
        for (index, machine) in self.machines.iter().enumerate() {
            if machine.tracked_ticks() == 0 {
                continue;
            }
            let share = machine.share(MachineState::Processing);
            if best.is_none_or(|(_, top)| share > top) {
                best = Some((index, share));
            }
        }
        best.map(|(index, _)| index)
    }

    // -- Management ---------------------------------------------------------

    /// Reset every counter. Tracked machines and their current state are kept.
    pub fn clear(&mut self) {
        for machine in &mut self.machines {
            let state = machine.state;
            *machine = MachineStats::new(self.config.window_size);
            machine.state = state;
        }
        self.throughput.clear();
        self.throughput_history.clear();
        self.finished_total = 0;
        self.lead_time_total = 0;
    }

    fn ensure_machine(&mut self, index: usize) -> &mut MachineStats {
        if index >= self.machines.len() {
            let window = self.config.window_size;
            self.machines.resize_with(index + 1, || MachineStats::new(window));
        }
        &mut self.machines[index]
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lineflow_core::id::ItemId;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn small_config() -> StatsConfig {
        StatsConfig {
            window_size: 10,
            history_capacity: 5,
        }
    }

    fn changed(
        machine: usize,
        from: MachineState,
        to: MachineState,
        cause: TransitionCause,
    ) -> Event {
        Event::StateChanged {
            machine,
            from,
            to,
            cause,
            time: 0,
        }
    }

    fn started(machine: usize) -> Event {
        changed(machine, MachineState::Idle, MachineState::Processing, TransitionCause::Started)
    }

    fn finished(machine: usize) -> Event {
        changed(machine, MachineState::Processing, MachineState::Idle, TransitionCause::Finished)
    }

    fn broke(machine: usize) -> Event {
        changed(machine, MachineState::Processing, MachineState::Down, TransitionCause::BrokeDown)
    }

    fn repaired(machine: usize) -> Event {
        changed(machine, MachineState::Down, MachineState::Processing, TransitionCause::Repaired)
    }

    fn done(machine: usize, lead_time: Millis) -> Event {
        Event::ItemFinished {
            item: ItemId(1),
            machine,
            lead_time,
            time: 0,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(3);
        for v in 1..=5 {
            rb.push(v);
        }
        assert_eq!(rb.to_vec(), vec![3, 4, 5]);
        assert_eq!(rb.latest(), Some(5));
        assert_eq!(rb.iter().len(), 3);
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.latest(), None);
    }

    #[test]
    fn ring_buffer_zero_capacity_holds_one() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(0);
        rb.push(1);
        rb.push(2);
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.to_vec(), vec![2]);
    }

    #[test]
    fn rolling_window_evicts() {
        let mut w = RollingWindow::new(3);
        for count in [3, 0, 0, 0] {
            w.add(count);
            w.commit();
        }
        assert_eq!(w.total(), 0);
        assert_eq!(w.rate(), Fixed64::ZERO);
    }

    #[test]
    fn idle_machine_tracked_when_presized() {
        let mut stats = LineStats::new(small_config()).with_machine_count(2);
        for tick in 1..=4 {
            stats.end_tick(tick);
        }
        assert_eq!(stats.idle_ratio(1), Fixed64::ONE);
        assert_eq!(stats.utilization(1), Fixed64::ZERO);
    }

    #[test]
    fn start_tick_counts_as_processing() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        // Tick 1: start. Tick 2: keep going. Tick 3: finish. Tick 4: idle.
        stats.process_event(&started(0));
        stats.end_tick(1);
        stats.end_tick(2);
        stats.process_event(&finished(0));
        stats.end_tick(3);
        stats.end_tick(4);
        assert_eq!(stats.utilization(0), fixed(0.75));
        assert_eq!(stats.idle_ratio(0), fixed(0.25));
    }

    #[test]
    fn start_and_finish_in_one_tick_is_processing() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        stats.process_event(&started(0));
        stats.process_event(&finished(0));
        stats.end_tick(1);
        assert_eq!(stats.utilization(0), Fixed64::ONE);
    }

    #[test]
    fn unblock_does_not_decide_tick() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        stats.process_event(&changed(
            0,
            MachineState::BlockedOutput,
            MachineState::Idle,
            TransitionCause::Unblocked,
        ));
        stats.process_event(&started(0));
        stats.end_tick(1);
        assert_eq!(stats.utilization(0), Fixed64::ONE);
        assert_eq!(stats.blocked_ratio(0), Fixed64::ZERO);
    }

    #[test]
    fn window_forgets_old_states() {
        let mut stats = LineStats::new(StatsConfig {
            window_size: 4,
            history_capacity: 5,
        })
        .with_machine_count(1);
        stats.process_event(&started(0));
        for tick in 1..=4 {
            stats.end_tick(tick);
        }
        stats.process_event(&finished(0));
        stats.end_tick(5);
        for tick in 6..=8 {
            stats.end_tick(tick);
        }
        // Window of 4: the finishing tick plus three idle ticks.
        assert_eq!(stats.utilization(0), fixed(0.25));
    }

    #[test]
    fn mtbf_and_mttr() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        assert_eq!(stats.mtbf_ticks(0), None);

        // Two processing ticks, then a breakdown tick (still processing).
        stats.process_event(&started(0));
        stats.end_tick(1);
        stats.end_tick(2);
        stats.process_event(&broke(0));
        stats.end_tick(3);
        // Down for two ticks; the repair tick counts as down.
        stats.end_tick(4);
        stats.process_event(&repaired(0));
        stats.end_tick(5);

        assert_eq!(stats.breakdowns(0), 1);
        assert_eq!(stats.mtbf_ticks(0), Some(fixed(3.0)));
        assert_eq!(stats.mttr_ticks(0), Some(fixed(2.0)));
    }

    #[test]
    fn throughput_and_lead_time() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        stats.process_event(&done(0, 1000));
        stats.end_tick(1);
        stats.process_event(&done(0, 3000));
        stats.end_tick(2);
        stats.end_tick(3);
        stats.end_tick(4);

        assert_eq!(stats.finished_total(), 2);
        assert_eq!(stats.throughput(), fixed(0.5));
        assert_eq!(stats.output_rate(0), fixed(0.5));
        assert_eq!(stats.mean_lead_time(), Some(2000));
        assert_eq!(stats.throughput_history().len(), 4);
    }

    #[test]
    fn throughput_history_bounded() {
        let mut stats = LineStats::new(small_config());
        for tick in 1..=20 {
            stats.end_tick(tick);
        }
        assert_eq!(stats.throughput_history().len(), 5);
    }

    #[test]
    fn bottleneck_picks_busiest_machine() {
        let mut stats = LineStats::new(small_config()).with_machine_count(3);
        stats.process_event(&started(1));
        stats.end_tick(1);
        stats.end_tick(2);
        assert_eq!(stats.bottleneck(), Some(1));
    }

    #[test]
    fn bottleneck_none_without_data() {
        let stats = LineStats::new(small_config());
        assert_eq!(stats.bottleneck(), None);
        let stats = LineStats::new(small_config()).with_machine_count(2);
        assert_eq!(stats.bottleneck(), None);
    }

    #[test]
    fn bottleneck_tie_goes_to_head() {
        let mut stats = LineStats::new(small_config()).with_machine_count(3);
        stats.process_event(&started(1));
        stats.process_event(&started(2));
        stats.end_tick(1);
        assert_eq!(stats.bottleneck(), Some(1));
    }

    #[test]
    fn shares_sum_to_one() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        stats.process_event(&started(0));
        stats.end_tick(1);
        stats.process_event(&broke(0));
        stats.end_tick(2);
        stats.end_tick(3);
        let sum = stats.utilization(0)
            + stats.idle_ratio(0)
            + stats.down_ratio(0)
            + stats.blocked_ratio(0);
        assert!((sum - Fixed64::ONE).abs() <= Fixed64::DELTA * 4);
    }

    #[test]
    fn unknown_machine_reads_zero() {
        let stats = LineStats::new(small_config());
        assert_eq!(stats.utilization(7), Fixed64::ZERO);
        assert_eq!(stats.breakdowns(7), 0);
        assert_eq!(stats.mttr_ticks(7), None);
    }

    #[test]
    fn events_grow_machine_list() {
        let mut stats = LineStats::new(small_config());
        stats.process_event(&started(4));
        assert_eq!(stats.machine_count(), 5);
    }

    #[test]
    fn clear_keeps_current_state() {
        let mut stats = LineStats::new(small_config()).with_machine_count(1);
        stats.process_event(&started(0));
        stats.process_event(&done(0, 500));
        stats.end_tick(1);
        stats.clear();
        assert_eq!(stats.finished_total(), 0);
        stats.end_tick(2);
        // Still processing after the reset.
        assert_eq!(stats.utilization(0), Fixed64::ONE);
    }
}
