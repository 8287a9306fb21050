//! Session Events
//!
//! Notifications for render-layer projections. The session stays the single
//! source of truth; subscribers re-read [`crate::EditingSession::elements`]
//! when told something changed and never hold domain state of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::element::ElementId;

/// Session event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    /// A page finished loading
    Loaded,
    /// Visible elements changed through a local edit
    Changed,
    /// Visible elements changed through undo or redo
    HistoryMoved,
    /// Selection changed
    SelectionChanged,
    /// Buffered changes were persisted
    Saved,
    /// A save attempt failed; buffered changes are intact
    SaveFailed,
    /// A soft-deleted element came back
    Restored,
    /// The server duplicated an element
    Duplicated,
}

impl SessionEventType {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Changed => "changed",
            Self::HistoryMoved => "history_moved",
            Self::SelectionChanged => "selection_changed",
            Self::Saved => "saved",
            Self::SaveFailed => "save_failed",
            Self::Restored => "restored",
            Self::Duplicated => "duplicated",
        }
    }

    /// Check if the event came out of a gateway round trip
    #[must_use]
    pub fn is_persistence_event(&self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::Saved | Self::SaveFailed | Self::Restored | Self::Duplicated
        )
    }
}

impl std::fmt::Display for SessionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Sequence number within the session
    pub sequence_num: u64,

    /// Event type
    pub event_type: SessionEventType,

    /// Page open when the event fired
    pub page_id: Option<Uuid>,

    /// Elements the event is about (empty for page-wide events)
    #[serde(default)]
    pub element_ids: Vec<ElementId>,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

/// Broadcasts session events to any number of subscribers
#[derive(Debug)]
pub struct EventPublisher {
    tx: broadcast::Sender<SessionEvent>,
    sequence: u64,
}

impl EventPublisher {
    /// Create a publisher buffering up to `capacity` events per lagging subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, sequence: 0 }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Get the number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event; silently dropped when nobody listens
    pub fn publish(
        &mut self,
        event_type: SessionEventType,
        page_id: Option<Uuid>,
        element_ids: Vec<ElementId>,
    ) {
        self.sequence += 1;
        let event = SessionEvent {
            sequence_num: self.sequence,
            event_type,
            page_id,
            element_ids,
            timestamp: Utc::now(),
        };
        let _ = self.tx.send(event);
    }
}
