use crate::fixed::Millis;
use crate::id::{ItemId, MachineId};
use serde::{Deserialize, Serialize};

/// One visit of an item to a machine. `exit_time` is `None` while the item is
/// still at that machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub machine: MachineId,
    pub entry_time: Millis,
    pub exit_time: Option<Millis>,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Time spent at the machine, if the visit has closed.
    pub fn duration(&self) -> Option<Millis> {
        self.exit_time.map(|exit| exit.saturating_sub(self.entry_time))
    }
}

/// A production unit flowing through the line.
///
/// Identity (`id`, `created_at`) never changes. The history is append-only and
/// carries at most one open entry at a time. Items are moved between machine
/// slots, never cloned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    created_at: Millis,
    completed_at: Option<Millis>,
    history: Vec<HistoryEntry>,
}

impl Item {
    pub fn new(id: ItemId, created_at: Millis) -> Self {
        Self {
            id,
            created_at,
            completed_at: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn created_at(&self) -> Millis {
        self.created_at
    }

    /// When the item reached finished goods.
    pub fn completed_at(&self) -> Option<Millis> {
        self.completed_at
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The entry for the machine currently holding the item, if any.
    pub fn open_entry(&self) -> Option<&HistoryEntry> {
        self.history.last().filter(|e| e.is_open())
    }

    /// Whether the item is currently being worked at `machine`.
    pub fn is_at(&self, machine: &MachineId) -> bool {
        self.open_entry().is_some_and(|e| &e.machine == machine)
    }

    /// Record entry into `machine` at `now`.
    ///
    /// Reopening an already-open visit to the same machine keeps the original
    /// entry time. Any other open visit is closed at `now` first so the item
    /// never has two open entries.
    pub fn enter(&mut self, machine: &MachineId, now: Millis) {
        if self.is_at(machine) {
            return;
        }
        if let Some(open) = self.history.last_mut().filter(|e| e.is_open()) {
            open.exit_time = Some(now.max(open.entry_time));
        }
        self.history.push(HistoryEntry {
            machine: machine.clone(),
            entry_time: now,
            exit_time: None,
        });
    }

    /// Close the open visit to `machine`. No-op if the item is not there.
    pub fn exit(&mut self, machine: &MachineId, now: Millis) {
        if let Some(open) = self
            .history
            .last_mut()
            .filter(|e| e.is_open() && &e.machine == machine)
        {
            open.exit_time = Some(now.max(open.entry_time));
        }
    }

    pub(crate) fn complete(&mut self, now: Millis) {
        self.completed_at = Some(now);
    }

    /// Total time from creation to completion.
    pub fn lead_time(&self) -> Option<Millis> {
        self.completed_at.map(|done| done.saturating_sub(self.created_at))
    }
}
