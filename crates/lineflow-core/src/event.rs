//! Typed line events with pre-allocated ring buffers.
//!
//! Events are emitted while a tick runs and delivered in batch at the end of
//! [`Line::simulation_step`](crate::line::Line::simulation_step). Each event
//! kind has its own [`EventBuffer`] with a fixed capacity. Presentation and
//! statistics layers attach as passive listeners; they observe, never mutate.
//!
//! Suppressed kinds are never buffered or delivered.

use crate::fixed::Millis;
use crate::id::ItemId;
use crate::machine::{MachineState, TransitionCause};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A line event. Machines are referred to by their index in line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new item was admitted to the head machine.
    ItemInjected { item: ItemId, time: Millis },
    StateChanged {
        machine: usize,
        from: MachineState,
        to: MachineState,
        cause: TransitionCause,
        time: Millis,
    },
    /// A finished item moved into the next machine's buffer.
    ItemHandedOff {
        item: ItemId,
        from: usize,
        to: usize,
        time: Millis,
    },
    /// An item left the tail machine into finished goods.
    ItemFinished {
        item: ItemId,
        machine: usize,
        lead_time: Millis,
        time: Millis,
    },
    OutputBlocked {
        machine: usize,
        item: ItemId,
        time: Millis,
    },
    /// `item` is `None` when a stray blocked state was cleared.
    OutputUnblocked {
        machine: usize,
        item: Option<ItemId>,
        time: Millis,
    },
    HistorySampled { cumulative_count: u64, time: Millis },
}

/// Discriminant tag for event types, used for suppression and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemInjected,
    StateChanged,
    ItemHandedOff,
    ItemFinished,
    OutputBlocked,
    OutputUnblocked,
    HistorySampled,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 7;

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ItemInjected,
        EventKind::StateChanged,
        EventKind::ItemHandedOff,
        EventKind::ItemFinished,
        EventKind::OutputBlocked,
        EventKind::OutputUnblocked,
        EventKind::HistorySampled,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ItemInjected { .. } => EventKind::ItemInjected,
            Event::StateChanged { .. } => EventKind::StateChanged,
            Event::ItemHandedOff { .. } => EventKind::ItemHandedOff,
            Event::ItemFinished { .. } => EventKind::ItemFinished,
            Event::OutputBlocked { .. } => EventKind::OutputBlocked,
            Event::OutputUnblocked { .. } => EventKind::OutputUnblocked,
            Event::HistorySampled { .. } => EventKind::HistorySampled,
        }
    }

    /// Simulated time at which the event occurred.
    pub fn time(&self) -> Millis {
        match self {
            Event::ItemInjected { time, .. }
            | Event::StateChanged { time, .. }
            | Event::ItemHandedOff { time, .. }
            | Event::ItemFinished { time, .. }
            | Event::OutputBlocked { time, .. }
            | Event::OutputUnblocked { time, .. }
            | Event::HistorySampled { time, .. } => *time,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Iterate over events from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        // head points at the oldest entry once the buffer has wrapped.
        let start = if self.len < self.capacity() { 0 } else { self.head };
        let capacity = self.capacity();
        (0..self.len).filter_map(move |offset| self.events[(start + offset) % capacity].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

struct Subscriber {
    listener: PassiveListener,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, listener lists, and suppression
/// flags.
#[derive(Debug)]
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    subscribers: [Vec<Subscriber>; EVENT_KIND_COUNT],
    default_capacity: usize,
}

impl EventBus {
    /// Create a bus with the given buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: Default::default(),
            default_capacity,
        }
    }

    /// Suppress an event kind. Its buffer is dropped and listeners are no
    /// longer called for it.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Register a listener for one kind. Called in registration order.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, None, listener);
    }

    /// Register a listener that only sees events accepted by `filter`.
    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        self.subscribers[kind.index()].push(Subscriber { listener, filter });
    }

    /// Deliver all buffered events to listeners, then clear the buffers.
    ///
    /// Kinds are delivered in declaration order; within a kind, events go
    /// oldest to newest.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }
            for sub in &mut self.subscribers[idx] {
                for event in buffer.iter() {
                    if let Some(filter) = &sub.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (sub.listener)(event);
                }
            }
            buffer.clear();
        }
    }

    /// Read-only access to one kind's pending events.
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffer(kind).map(|b| b.len()).unwrap_or(0)
    }

    /// Total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffer(kind).map(|b| b.total_written()).unwrap_or(0)
    }

    /// Clear all buffers. Listeners and suppression are kept.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
