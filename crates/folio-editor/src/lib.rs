//! Folio Editor - Notebook Page Editing Core
//!
//! This crate provides the editing state behind one open notebook page:
//! - Element: Page elements, geometry and partial updates
//! - Units: Millimeter/pixel conversion
//! - Directory: Last-synced elements of the open page
//! - Buffer: Unsaved creates, updates and deletes
//! - History: Bounded undo/redo snapshots
//! - Selection: Selected elements, primary first
//! - Clipboard: Single-element copy/paste slot
//! - Gateway: Persistence contract and in-memory implementation
//! - Session: Editing session tying the pieces together
//! - Events: Change notifications for render layers
//! - Error: Error types for editor operations
//!
//! ## Features
//!
//! - Local edits never block on the network
//! - Batched, all-or-nothing saves with local-to-server identity remapping
//! - Deleted elements are hidden immediately and soft-deleted on save
//! - Edits made while a save is in flight are kept for the next save
//! - Undo/redo across saves
//!
//! ## Usage
//!
//! ```ignore
//! use folio_editor::{EditingSession, MemoryGateway, NewElement, Position, Size};
//! use std::sync::Arc;
//!
//! let gateway = Arc::new(MemoryGateway::new());
//! let mut session = EditingSession::new(gateway);
//!
//! session.load(page_id).await?;
//! let id = session.add_element(NewElement::text(
//!     "Dear diary",
//!     Position::new(20.0, 30.0),
//!     Size::new(80.0, 12.0),
//! ))?;
//! session.save().await?;
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [editor]
//! history_capacity = 50
//! paste_offset_mm = 10.0
//! event_capacity = 64
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod clipboard;
pub mod config;
pub mod directory;
pub mod element;
pub mod error;
pub mod events;
pub mod gateway;
pub mod history;
pub mod selection;
pub mod session;
pub mod units;

// Re-export main types
pub use buffer::{BufferEntry, Change, ChangeBuffer, FlushBatch, FlushReport, Tombstone};
pub use clipboard::{ClipboardSlot, DEFAULT_PASTE_OFFSET_MM};
pub use config::EditorConfig;
pub use directory::ElementDirectory;
pub use element::{
    Element, ElementId, ElementKind, ElementPatch, Lifecycle, NewElement, Page, Position, Size,
};
pub use error::{Error, Result};
pub use events::{EventPublisher, SessionEvent, SessionEventType};
pub use gateway::{
    BatchSaveResult, CreatedElement, MemoryGateway, PersistenceGateway, SaveOperation,
};
pub use history::{HistoryLog, Snapshot, DEFAULT_HISTORY_CAPACITY};
pub use selection::Selection;
pub use session::{EditingSession, ReorderAction, SessionState};
pub use units::{mm_to_px, px_to_mm, PixelRect, PRINT_DPI, SCREEN_DPI};
