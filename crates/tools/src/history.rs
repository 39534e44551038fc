use crate::diff::{DiffEntry, diff};
use serde::Serialize;
use std::collections::VecDeque;
use strata_common::Snapshot;
use strata_kernel::ActionRecord;

/// One recorded state plus the action that produced it, if known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub snapshot: Snapshot,
    pub action: Option<ActionRecord>,
}

/// Time-travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Bounded, linear state history with a movable pointer.
///
/// Works like an undo/redo pair flattened into one sequence: entries before
/// the pointer are the past, entries after it are the redo side, and
/// recording a new entry discards the redo side.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    pointer: usize,
    max_size: usize,
}

impl History {
    /// Create an empty history holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            pointer: 0,
            max_size: max_size.max(1),
        }
    }

    /// Append a snapshot after the pointer, discarding any entries past it
    /// and evicting the oldest entry when over capacity.
    pub fn record(&mut self, snapshot: Snapshot, action: Option<ActionRecord>) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.pointer + 1);
        }
        self.entries.push_back(HistoryEntry { snapshot, action });
        if self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        self.pointer = self.entries.len() - 1;
    }

    /// Move the pointer one step. Returns the snapshot now under the pointer,
    /// or `None` if there was nowhere to go.
    pub fn step(&mut self, direction: Direction) -> Option<&Snapshot> {
        if !self.can_step(direction) {
            return None;
        }
        match direction {
            Direction::Prev => self.pointer -= 1,
            Direction::Next => self.pointer += 1,
        }
        self.entries.get(self.pointer).map(|entry| &entry.snapshot)
    }

    /// Whether `step(direction)` would move.
    pub fn can_step(&self, direction: Direction) -> bool {
        match direction {
            Direction::Prev => self.pointer > 0,
            Direction::Next => self.pointer + 1 < self.entries.len(),
        }
    }

    /// Replace everything with a single entry.
    pub fn reset(&mut self, snapshot: Snapshot) {
        self.entries.clear();
        self.entries.push_back(HistoryEntry {
            snapshot,
            action: None,
        });
        self.pointer = 0;
    }

    /// The entry under the pointer.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.pointer)
    }

    /// The entry just before the pointer.
    pub fn previous(&self) -> Option<&HistoryEntry> {
        self.pointer
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }

    /// Changes made by the entry under the pointer. Empty at the first entry.
    pub fn diff_at_pointer(&self) -> Vec<DiffEntry> {
        match (self.previous(), self.current()) {
            (Some(prev), Some(curr)) => diff(&prev.snapshot, &curr.snapshot),
            _ => Vec::new(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
