//! The line coordinator: owns the machines in physical order and runs the
//! per-tick flow-control protocol.
//!
//! # Tick protocol
//!
//! Each [`Line::simulation_step`] runs, as one atomic step:
//! 1. **Clock** -- advance simulated time by `dt`.
//! 2. **Injection** -- if the head machine is idle, empty-handed and has
//!    buffer room, offer it a new item with the configured probability.
//! 3. **Sweep** -- visit machines tail to head. Each machine first retries a
//!    blocked hand-off, then runs its own `update`; a freshly finished item is
//!    handed off immediately or the machine blocks holding it.
//! 4. **History** -- every `history_sample_interval` ticks, sample cumulative
//!    finished goods into the bounded production history.
//! 5. **Delivery** -- buffered events go to passive listeners.
//!
//! Sweeping from the output end means a slot freed at machine `i` is visible
//! to machine `i - 1` within the same tick.

use crate::config::{validate_line, ConfigError, LineConfig, MachineConfig};
use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, Millis};
use crate::id::ItemId;
use crate::item::Item;
use crate::machine::{Machine, MachineState};
use crate::query::{HistorySample, LineSnapshot, MachineSnapshot};
use crate::rng::{RandomSource, SimRng};
use crate::sim::{SimState, StateHash};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// An ordered chain of machines joined by their input buffers.
#[derive(Debug)]
pub struct Line<R = SimRng> {
    config: LineConfig,
    machines: Vec<Machine>,
    finished_goods: Vec<Item>,
    production_history: VecDeque<HistorySample>,
    sim: SimState,
    injection_chance: Fixed64,
    /// Next id to hand out. Ids are never reused, even for rejected items.
    next_item_id: u64,
    /// Items admitted to the line.
    items_created: u64,
    rng: R,
    events: EventBus,
}

impl Line<SimRng> {
    /// Build a line using the default random source seeded from
    /// `config.seed`.
    pub fn new(config: LineConfig, machines: Vec<MachineConfig>) -> Result<Self, ConfigError> {
        let rng = SimRng::new(config.seed);
        Self::with_rng(config, machines, rng)
    }
}

impl<R: RandomSource> Line<R> {
    /// Build a line with an explicit random source.
    pub fn with_rng(
        config: LineConfig,
        machines: Vec<MachineConfig>,
        rng: R,
    ) -> Result<Self, ConfigError> {
        validate_line(&config, &machines)?;
        let machines = machines
            .into_iter()
            .map(|m| Machine::new(m, config.tick_interval_ms))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(machines = machines.len(), "line assembled");
        // Room for every machine to change state several times in one tick.
        let event_capacity = (machines.len() * 8).max(1024);

        Ok(Self {
            injection_chance: config.injection_chance(),
            production_history: VecDeque::with_capacity(config.history_capacity),
            config,
            machines,
            finished_goods: Vec::new(),
            sim: SimState::new(),
            next_item_id: 1,
            items_created: 0,
            rng,
            events: EventBus::new(event_capacity),
        })
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance the whole line by exactly one tick of `dt` milliseconds.
    pub fn simulation_step(&mut self, dt: Millis) {
        let now = self.sim.advance(dt);

        self.inject_at_head(now);

        for index in (0..self.machines.len()).rev() {
            self.step_machine(index, dt, now);
        }

        if self.sim.tick % self.config.history_sample_interval == 0 {
            self.sample_history(now);
        }

        self.events.deliver();
    }

    /// Offer a new item to the head machine, bypassing the injection
    /// probability and the idle check.
    ///
    /// The only refusal is a full head buffer (or an empty line); the item is
    /// then handed back and its id stays consumed.
    pub fn inject_item(&mut self) -> Result<ItemId, Item> {
        let now = self.sim.time;
        let item = self.mint_item(now);
        self.admit(item, now)
    }

    fn inject_at_head(&mut self, now: Millis) {
        let Some(head) = self.machines.first() else {
            return;
        };
        if head.state() != MachineState::Idle
            || head.current_item().is_some()
            || !head.has_buffer_space()
        {
            return;
        }
        if !self.rng.chance(self.injection_chance) {
            return;
        }
        let item = self.mint_item(now);
        // Room was checked above, so this cannot hand the item back.
        let _ = self.admit(item, now);
    }

    fn mint_item(&mut self, now: Millis) -> Item {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        Item::new(id, now)
    }

    fn admit(&mut self, item: Item, now: Millis) -> Result<ItemId, Item> {
        let Some(head) = self.machines.first_mut() else {
            return Err(item);
        };
        let id = item.id();
        head.try_add_item_to_buffer(item)?;
        self.items_created += 1;
        debug!(item = %id, time = now, "item injected");
        self.events.emit(Event::ItemInjected { item: id, time: now });
        Ok(id)
    }

    fn step_machine(&mut self, index: usize, dt: Millis, now: Millis) {
        let (head, tail) = self.machines.split_at_mut(index + 1);
        let machine = &mut head[index];
        let mut downstream = tail.first_mut();

        // Retry a pending hand-off before the machine does anything else.
        if machine.state() == MachineState::BlockedOutput {
            if machine.blocked_item().is_none() {
                machine.clear_blocked_output(now);
                self.events.emit(Event::OutputUnblocked {
                    machine: index,
                    item: None,
                    time: now,
                });
            } else if downstream.as_ref().is_none_or(|next| next.has_buffer_space())
                && let Some(item) = machine.clear_blocked_output(now)
            {
                self.events.emit(Event::OutputUnblocked {
                    machine: index,
                    item: Some(item.id()),
                    time: now,
                });
                let delivered = hand_off(
                    item,
                    index,
                    downstream.as_deref_mut(),
                    &mut self.finished_goods,
                    &mut self.events,
                    now,
                );
                if let Err(item) = delivered {
                    machine.hold_blocked(item, now);
                }
            }
        }

        if let Some(item) = machine.update(dt, now, &mut self.rng) {
            let delivered = hand_off(
                item,
                index,
                downstream.as_deref_mut(),
                &mut self.finished_goods,
                &mut self.events,
                now,
            );
            match delivered {
                Ok(()) => machine.credit_processed(),
                Err(item) => {
                    self.events.emit(Event::OutputBlocked {
                        machine: index,
                        item: item.id(),
                        time: now,
                    });
                    machine.hold_blocked(item, now);
                }
            }
        }

        for t in machine.drain_transitions() {
            self.events.emit(Event::StateChanged {
                machine: index,
                from: t.from,
                to: t.to,
                cause: t.cause,
                time: t.time,
            });
        }
    }

    fn sample_history(&mut self, now: Millis) {
        let cumulative_count = self.finished_goods.len() as u64;
        self.production_history.push_back(HistorySample {
            time: now,
            cumulative_count,
        });
        while self.production_history.len() > self.config.history_capacity {
            self.production_history.pop_front();
        }
        self.events.emit(Event::HistorySampled {
            cumulative_count,
            time: now,
        });
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machine(&self, index: usize) -> Option<&Machine> {
        self.machines.get(index)
    }

    /// Direct machine access for drivers and test harnesses.
    pub fn machine_mut(&mut self, index: usize) -> Option<&mut Machine> {
        self.machines.get_mut(index)
    }

    pub fn finished_goods(&self) -> &[Item] {
        &self.finished_goods
    }

    pub fn finished_count(&self) -> u64 {
        self.finished_goods.len() as u64
    }

    /// Bounded series of cumulative finished-goods samples, oldest first.
    pub fn production_history(&self) -> impl Iterator<Item = &HistorySample> {
        self.production_history.iter()
    }

    pub fn global_time(&self) -> Millis {
        self.sim.time
    }

    pub fn tick(&self) -> u64 {
        self.sim.tick
    }

    /// Items admitted to the line so far.
    pub fn items_created(&self) -> u64 {
        self.items_created
    }

    /// Items currently inside machines (buffers, in process, or blocked).
    pub fn work_in_progress(&self) -> u64 {
        self.machines.iter().map(|m| m.item_count() as u64).sum()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable bus access for subscribing listeners and suppressing kinds.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            time: self.sim.time,
            tick: self.sim.tick,
            machines: self
                .machines
                .iter()
                .enumerate()
                .map(|(i, m)| MachineSnapshot::of(i, m))
                .collect(),
            items_created: self.items_created,
            finished_count: self.finished_count(),
            production_history: self.production_history.iter().copied().collect(),
        }
    }

    /// Deterministic hash of the full line state.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.sim.tick);
        h.write_u64(self.sim.time);
        h.write_u64(self.items_created);
        h.write_u64(self.next_item_id);
        h.write_u64(self.finished_count());
        for item in &self.finished_goods {
            h.write_u64(item.id().0);
        }
        for machine in &self.machines {
            hash_machine(&mut h, machine);
        }
        h.finish()
    }
}

/// Move a finished item out of machine `from`: into the next buffer, or into
/// finished goods when `from` is the tail. Hands the item back if the next
/// buffer is full.
fn hand_off(
    mut item: Item,
    from: usize,
    downstream: Option<&mut Machine>,
    finished_goods: &mut Vec<Item>,
    events: &mut EventBus,
    now: Millis,
) -> Result<(), Item> {
    let id = item.id();
    match downstream {
        Some(next) => {
            next.try_add_item_to_buffer(item)?;
            trace!(item = %id, from, to = from + 1, "hand-off");
            events.emit(Event::ItemHandedOff {
                item: id,
                from,
                to: from + 1,
                time: now,
            });
        }
        None => {
            item.complete(now);
            let lead_time = item.lead_time().unwrap_or(0);
            trace!(item = %id, lead_time, "finished goods");
            events.emit(Event::ItemFinished {
                item: id,
                machine: from,
                lead_time,
                time: now,
            });
            finished_goods.push(item);
        }
    }
    Ok(())
}

pub(crate) fn hash_machine(h: &mut StateHash, machine: &Machine) {
    h.write_usize(machine.state().index());
    h.write_u64(machine.time_in_state());
    h.write_usize(machine.buffer_len());
    for item in machine.buffer() {
        h.write_u64(item.id().0);
    }
    h.write_opt_u64(machine.current_item().map(|i| i.id().0));
    h.write_opt_u64(machine.blocked_item().map(|i| i.id().0));
    let m = machine.metrics();
    h.write_u64(m.processed_items);
    h.write_u64(m.time_processing_ms);
    h.write_u64(m.time_idle_ms);
    h.write_u64(m.time_down_ms);
    h.write_u64(m.time_blocked_ms);
    h.write_u64(m.breakdowns);
    h.write_fixed64(machine.current_oee());
}

// ===========================================================================
// Tests
// ===========================================================================
