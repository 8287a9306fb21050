//! # Undo/Redo History
//!
//! Bounded log of full page snapshots.
//!
//! ## Design
//!
//! - Every snapshot is an independent deep copy of the visible elements
//! - A cursor marks the snapshot matching the live state
//! - Undo/redo move the cursor by one and hand back the snapshot there
//! - Pushing while the cursor is behind the tail discards the undone branch
//! - Over capacity, the oldest snapshot is evicted
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = HistoryLog::new();
//! history.push(Snapshot::new(loaded));
//! history.push(Snapshot::new(after_edit));
//!
//! let previous = history.undo();  // Some(loaded)
//! let next = history.redo();      // Some(after_edit)
//! ```

use std::collections::VecDeque;

use crate::element::{Element, ElementId};

/// Default number of snapshots kept
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Visible page state at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Elements in ascending z-order
    pub elements: Vec<Element>,

    /// Optional description of the edit that produced this state
    pub label: Option<String>,
}

impl Snapshot {
    /// Create a snapshot
    #[must_use]
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            label: None,
        }
    }

    /// Add a description
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn remap(&mut self, old: ElementId, new: ElementId) {
        for element in &mut self.elements {
            if element.id == old {
                element.id = new;
            }
        }
    }
}

/// Undo/redo log for one open page
#[derive(Debug, Clone)]
pub struct HistoryLog {
    snapshots: VecDeque<Snapshot>,
    cursor: usize,
    capacity: usize,
}

impl HistoryLog {
    /// Create a log with the default capacity (50)
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a log with a custom capacity (at least 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// Record a new state, discarding any undone branch
    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.cursor + 1);
        }
        self.snapshots.push_back(snapshot);

        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        self.cursor = self.snapshots.len() - 1;
    }

    /// Step back; `None` at the oldest snapshot
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor)
    }

    /// Step forward; `None` at the newest snapshot
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.snapshots.get(self.cursor)
    }

    /// Check if undo is available
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Check if redo is available
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Snapshot at the cursor
    #[must_use]
    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.cursor)
    }

    /// Cursor position
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Get the number of stored snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Maximum number of snapshots kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Description of the edit the next undo reverts
    #[must_use]
    pub fn undo_label(&self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.current().and_then(|s| s.label.as_deref())
    }

    /// Overwrite the snapshot at the cursor, e.g. after a save refreshed
    /// server-stamped fields; pushes when the log is empty
    pub fn replace_current(&mut self, snapshot: Snapshot) {
        match self.snapshots.get_mut(self.cursor) {
            Some(current) => *current = snapshot,
            None => self.push(snapshot),
        }
    }

    /// Drop all snapshots
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    /// Replace an identity in every stored snapshot
    pub fn remap(&mut self, old: ElementId, new: ElementId) {
        for snapshot in &mut self.snapshots {
            snapshot.remap(old, new);
        }
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
