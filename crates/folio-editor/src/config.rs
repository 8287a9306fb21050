//! Editor configuration
//!
//! Tunables of an editing session. The host application deserializes this
//! from its own configuration sources (see the `folio` binary).

use serde::{Deserialize, Serialize};

use crate::clipboard::DEFAULT_PASTE_OFFSET_MM;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Editing session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Snapshots kept for undo/redo
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Offset applied to pasted elements on both axes, in millimeters
    #[serde(default = "default_paste_offset_mm")]
    pub paste_offset_mm: f64,

    /// Events buffered per lagging subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_paste_offset_mm() -> f64 {
    DEFAULT_PASTE_OFFSET_MM
}

fn default_event_capacity() -> usize {
    64
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            paste_offset_mm: default_paste_offset_mm(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EditorConfig {
    /// Set the history capacity
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the paste offset
    #[must_use]
    pub fn with_paste_offset(mut self, offset_mm: f64) -> Self {
        self.paste_offset_mm = offset_mm;
        self
    }
}
