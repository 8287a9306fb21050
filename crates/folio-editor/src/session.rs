//! Editing Session
//!
//! One `EditingSession` owns the live state of one open page: the synced
//! directory, the buffered edits, undo history, selection and clipboard.
//! Local edits are synchronous and never touch the network; the gateway is
//! only reached by `load`, `save`, `duplicate` and `restore`.
//!
//! ```text
//! Empty ──load──▶ Loading ──ok──▶ Ready ◀──▶ Saving
//!                    │             ▲
//!                    └──err──▶ prior state
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{ChangeBuffer, FlushBatch, FlushReport};
use crate::clipboard::ClipboardSlot;
use crate::config::EditorConfig;
use crate::directory::ElementDirectory;
use crate::element::{Element, ElementId, ElementKind, ElementPatch, NewElement, Page};
use crate::error::{Error, Result};
use crate::events::{EventPublisher, SessionEvent, SessionEventType};
use crate::gateway::{BatchSaveResult, PersistenceGateway};
use crate::history::{HistoryLog, Snapshot};
use crate::selection::Selection;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No page loaded
    Empty,
    /// Fetching a page
    Loading,
    /// Page open, no save in flight
    Ready,
    /// Page open, a save is in flight
    Saving,
}

impl SessionState {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Saving => "saving",
        }
    }

    /// Check if local edits are accepted
    #[must_use]
    pub fn accepts_edits(&self) -> bool {
        matches!(self, Self::Ready | Self::Saving)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stacking change for [`EditingSession::reorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderAction {
    /// Above every other element
    BringToFront,
    /// Below every other element
    SendToBack,
    /// Swap with the element directly above
    BringForward,
    /// Swap with the element directly below
    SendBackward,
    /// Explicit z-order
    SetZ(i64),
}

/// Editing session for one open page
pub struct EditingSession {
    gateway: Arc<dyn PersistenceGateway>,
    config: EditorConfig,
    state: SessionState,
    page: Option<Page>,
    directory: ElementDirectory,
    buffer: ChangeBuffer,
    history: HistoryLog,
    selection: Selection,
    clipboard: ClipboardSlot,
    events: EventPublisher,
    last_error: Option<Error>,
}

impl EditingSession {
    /// Create a session with the default configuration
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_config(gateway, EditorConfig::default())
    }

    /// Create a session with a specific configuration
    #[must_use]
    pub fn with_config(gateway: Arc<dyn PersistenceGateway>, config: EditorConfig) -> Self {
        Self {
            gateway,
            history: HistoryLog::with_capacity(config.history_capacity),
            events: EventPublisher::new(config.event_capacity),
            config,
            state: SessionState::Empty,
            page: None,
            directory: ElementDirectory::new(),
            buffer: ChangeBuffer::new(),
            selection: Selection::new(),
            clipboard: ClipboardSlot::new(),
            last_error: None,
        }
    }

    // ------------------------------------------------------------------
    // Page lifecycle
    // ------------------------------------------------------------------

    /// Open a page, discarding buffered edits and history of the previous one
    ///
    /// On failure the previously open page stays untouched.
    pub async fn load(&mut self, page_id: Uuid) -> Result<()> {
        if self.state == SessionState::Saving {
            return Err(Error::SaveInProgress);
        }

        let prior = self.state;
        self.state = SessionState::Loading;
        info!(page_id = %page_id, gateway = self.gateway.name(), "Loading page");

        let fetched = match self.gateway.fetch_page(page_id).await {
            Ok(page) => self
                .gateway
                .fetch_elements(page_id)
                .await
                .map(|elements| (page, elements)),
            Err(e) => Err(e),
        };

        let (page, elements) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                self.state = prior;
                return self.fail("load", e);
            }
        };

        self.directory.replace_all(page_id, elements);
        self.buffer = ChangeBuffer::new();
        self.selection.clear();
        self.history.clear();
        self.history.push(Snapshot::new(self.directory.all().to_vec()));
        self.page = Some(page);
        self.state = SessionState::Ready;
        self.last_error = None;

        info!(page_id = %page_id, elements = self.directory.len(), "Page loaded");
        self.events.publish(SessionEventType::Loaded, Some(page_id), Vec::new());
        Ok(())
    }

    /// Persist every buffered edit in one batch
    ///
    /// A failed save leaves the buffer exactly as it was and records the error
    /// in [`EditingSession::last_error`]. History is kept across saves.
    pub async fn save(&mut self) -> Result<FlushReport> {
        let Some(batch) = self.begin_save()? else {
            return Ok(FlushReport::default());
        };
        let result = self
            .gateway
            .batch_save(batch.page_id, batch.operations.clone())
            .await;
        self.finish_save(batch, result)
    }

    /// First half of a save: snapshot the buffer and enter `Saving`
    ///
    /// Returns `None` when nothing is pending. Local edits stay allowed until
    /// [`EditingSession::finish_save`] is called; they are kept for the next
    /// save.
    pub fn begin_save(&mut self) -> Result<Option<FlushBatch>> {
        if self.state == SessionState::Saving {
            return Err(Error::SaveInProgress);
        }
        let page_id = self.active_page_id()?;

        let Some(batch) = self.buffer.prepare_flush(page_id) else {
            debug!(page_id = %page_id, "Nothing to save");
            return Ok(None);
        };
        info!(page_id = %page_id, operations = batch.len(), "Saving page");
        self.state = SessionState::Saving;
        Ok(Some(batch))
    }

    /// Second half of a save: fold the gateway outcome back in
    pub fn finish_save(
        &mut self,
        batch: FlushBatch,
        result: Result<BatchSaveResult>,
    ) -> Result<FlushReport> {
        if self.state != SessionState::Saving {
            warn!(page_id = %batch.page_id, state = %self.state, "Ignoring save result without a save in flight");
            return Err(Error::validation("no save is in flight"));
        }
        self.state = SessionState::Ready;

        let outcome = match result {
            Ok(response) => self
                .buffer
                .complete_flush(&batch, response, &mut self.directory),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                for (old, new) in &report.remaps {
                    self.selection.remap(*old, *new);
                    self.history.remap(*old, *new);
                }
                let snapshot = self.snapshot();
                self.history.replace_current(snapshot);
                self.last_error = None;

                info!(
                    page_id = %batch.page_id,
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    pending = self.buffer.len(),
                    "Page saved"
                );
                let ids = report.remaps.iter().map(|(_, new)| *new).collect();
                self.events
                    .publish(SessionEventType::Saved, Some(batch.page_id), ids);
                Ok(report)
            }
            Err(e) => {
                self.events
                    .publish(SessionEventType::SaveFailed, Some(batch.page_id), Vec::new());
                self.fail("save", e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    /// Add an element on top of the page (unless it carries a z-order)
    pub fn add_element(&mut self, element: NewElement) -> Result<ElementId> {
        let page_id = self.active_page_id()?;
        let id = self.buffer.add(element, page_id, &self.directory)?;
        self.record_change("Add element", vec![id]);
        Ok(id)
    }

    /// Apply a partial update to an element
    pub fn update_element(&mut self, id: ElementId, patch: ElementPatch) -> Result<()> {
        self.active_page_id()?;
        if patch.is_empty() {
            return match self.buffer.current(&id, &self.directory) {
                Some(_) => Ok(()),
                None => Err(Error::NotFound(id)),
            };
        }
        self.buffer.update(id, &patch, &self.directory)?;
        self.record_change("Update element", vec![id]);
        Ok(())
    }

    /// Delete an element and drop it from the selection
    pub fn delete_element(&mut self, id: ElementId) -> Result<()> {
        self.active_page_id()?;
        self.buffer.remove(id, &self.directory)?;
        if self.selection.retain(|s| *s != id) {
            self.publish_selection();
        }
        self.record_change("Delete element", vec![id]);
        Ok(())
    }

    /// Delete every selected element as a single undo step
    pub fn delete_selected(&mut self) -> Result<usize> {
        self.active_page_id()?;
        let ids = self.selection.ids().to_vec();
        if ids.is_empty() {
            return Ok(0);
        }
        if let Some(missing) = ids
            .iter()
            .find(|id| self.buffer.current(id, &self.directory).is_none())
        {
            return Err(Error::NotFound(*missing));
        }

        for id in &ids {
            self.buffer.remove(*id, &self.directory)?;
        }
        self.selection.clear();
        self.publish_selection();
        let count = ids.len();
        self.record_change("Delete selection", ids);
        Ok(count)
    }

    /// Change the stacking position of an element
    ///
    /// Forward/backward swap z-order with the neighbouring element; when both
    /// share a z-order the moved element ends one step past it.
    pub fn reorder(&mut self, id: ElementId, action: ReorderAction) -> Result<()> {
        self.active_page_id()?;
        let current = self
            .buffer
            .current(&id, &self.directory)
            .ok_or(Error::NotFound(id))?;
        let visible = self.buffer.visible(&self.directory);
        let others = || visible.iter().filter(move |e| e.id != id);
        let key = |e: &Element| (e.z_index, e.id);

        let mut changes: Vec<(ElementId, i64)> = Vec::new();
        match action {
            ReorderAction::SetZ(z) => changes.push((id, z)),
            ReorderAction::BringToFront => {
                if let Some(top) = others().map(|e| e.z_index).max() {
                    if top >= current.z_index {
                        changes.push((id, shift_z(top, 1)?));
                    }
                }
            }
            ReorderAction::SendToBack => {
                if let Some(bottom) = others().map(|e| e.z_index).min() {
                    if bottom <= current.z_index {
                        changes.push((id, shift_z(bottom, -1)?));
                    }
                }
            }
            ReorderAction::BringForward => {
                if let Some(above) = others()
                    .filter(|e| key(e) > key(&current))
                    .min_by_key(|e| key(e))
                {
                    if above.z_index == current.z_index {
                        changes.push((id, shift_z(above.z_index, 1)?));
                    } else {
                        changes.push((id, above.z_index));
                        changes.push((above.id, current.z_index));
                    }
                }
            }
            ReorderAction::SendBackward => {
                if let Some(below) = others()
                    .filter(|e| key(e) < key(&current))
                    .max_by_key(|e| key(e))
                {
                    if below.z_index == current.z_index {
                        changes.push((id, shift_z(below.z_index, -1)?));
                    } else {
                        changes.push((id, below.z_index));
                        changes.push((below.id, current.z_index));
                    }
                }
            }
        }

        if changes.iter().all(|(target, z)| *target == id && *z == current.z_index) {
            debug!(element_id = %id, ?action, "Reorder left stacking unchanged");
            return Ok(());
        }

        let ids: Vec<ElementId> = changes.iter().map(|(target, _)| *target).collect();
        for (target, z) in changes {
            self.buffer
                .update(target, &ElementPatch::new().z_index(z), &self.directory)?;
        }
        self.record_change("Reorder", ids);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Server-mediated operations
    // ------------------------------------------------------------------

    /// Ask the server to copy a persisted element; the copy is selected
    pub async fn duplicate(&mut self, id: ElementId) -> Result<ElementId> {
        let page_id = self.active_page_id()?;
        let Some(server_id) = id.as_uuid() else {
            return Err(Error::validation(format!(
                "{id} has not been saved yet and cannot be duplicated"
            )));
        };
        if !self.directory.contains(&id) || self.buffer.current(&id, &self.directory).is_none() {
            return Err(Error::NotFound(id));
        }

        let copy = match self.gateway.duplicate_element(server_id).await {
            Ok(copy) => copy,
            Err(e) => return self.fail("duplicate", e),
        };

        let copy_id = copy.id;
        self.directory.upsert(copy);
        self.selection.select(copy_id);
        self.last_error = None;

        debug!(source = %id, copy = %copy_id, "Element duplicated");
        self.history
            .push(Snapshot::new(self.buffer.visible(&self.directory)).with_label("Duplicate"));
        self.events
            .publish(SessionEventType::Duplicated, Some(page_id), vec![copy_id]);
        self.publish_selection();
        Ok(copy_id)
    }

    /// Ask the server to clear an element's soft-delete marker
    pub async fn restore(&mut self, id: ElementId) -> Result<Element> {
        let page_id = self.active_page_id()?;
        let Some(server_id) = id.as_uuid() else {
            return Err(Error::validation(format!(
                "{id} was never saved and cannot be restored"
            )));
        };

        let restored = match self.gateway.restore_element(server_id).await {
            Ok(restored) => restored,
            Err(e) => return self.fail("restore", e),
        };

        if restored.page_id != page_id {
            warn!(
                element_id = %id,
                page_id = %page_id,
                owner = %restored.page_id,
                "Restored element belongs to another page"
            );
            return Err(Error::NotFound(id));
        }

        self.directory.upsert(restored.clone());
        self.last_error = None;

        debug!(element_id = %id, "Element restored");
        self.history
            .push(Snapshot::new(self.buffer.visible(&self.directory)).with_label("Restore"));
        self.events
            .publish(SessionEventType::Restored, Some(page_id), vec![id]);
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Revert to the previous snapshot; returns whether anything changed
    pub fn undo(&mut self) -> Result<bool> {
        self.active_page_id()?;
        let Some(snapshot) = self.history.undo().cloned() else {
            return Ok(false);
        };
        self.apply_snapshot(&snapshot);
        Ok(true)
    }

    /// Re-apply the next snapshot; returns whether anything changed
    pub fn redo(&mut self) -> Result<bool> {
        self.active_page_id()?;
        let Some(snapshot) = self.history.redo().cloned() else {
            return Ok(false);
        };
        self.apply_snapshot(&snapshot);
        Ok(true)
    }

    /// Check if undo is available
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Check if redo is available
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ------------------------------------------------------------------
    // Selection & clipboard
    // ------------------------------------------------------------------

    /// Select a single element
    pub fn select(&mut self, id: ElementId) -> Result<()> {
        self.ensure_visible(id)?;
        self.selection.select(id);
        self.publish_selection();
        Ok(())
    }

    /// Add an element to, or remove it from, the selection
    pub fn toggle_select(&mut self, id: ElementId) -> Result<bool> {
        self.ensure_visible(id)?;
        let selected = self.selection.toggle(id);
        self.publish_selection();
        Ok(selected)
    }

    /// Select every visible element, bottom to top
    pub fn select_all(&mut self) -> Result<()> {
        self.active_page_id()?;
        let ids = self.buffer.visible(&self.directory).into_iter().map(|e| e.id);
        self.selection.select_all(ids);
        self.publish_selection();
        Ok(())
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.publish_selection();
        }
    }

    /// Copy the primary selected element; returns whether anything was copied
    pub fn copy(&mut self) -> Result<bool> {
        self.active_page_id()?;
        let Some(primary) = self.selection.primary() else {
            return Ok(false);
        };
        let element = self
            .buffer
            .current(&primary, &self.directory)
            .ok_or(Error::NotFound(primary))?;
        self.clipboard.copy(&element);
        debug!(element_id = %primary, "Copied to clipboard");
        Ok(true)
    }

    /// Paste the clipboard as a new, selected element
    ///
    /// Each paste starts from the copied element, offset by the configured
    /// delta. Returns `None` when the clipboard is empty.
    pub fn paste(&mut self) -> Result<Option<ElementId>> {
        let page_id = self.active_page_id()?;
        let Some(new) = self.clipboard.paste(self.config.paste_offset_mm) else {
            return Ok(None);
        };
        let id = self.buffer.add(new, page_id, &self.directory)?;
        self.selection.select(id);
        self.record_change("Paste", vec![id]);
        self.publish_selection();
        Ok(Some(id))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Visible elements in ascending z-order
    #[must_use]
    pub fn elements(&self) -> Vec<Element> {
        self.buffer.visible(&self.directory)
    }

    /// Visible elements of one kind
    #[must_use]
    pub fn elements_of_kind(&self, kind: ElementKind) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// Current value of one element
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.buffer.current(&id, &self.directory)
    }

    /// Currently open page
    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Selected identities, primary first
    #[must_use]
    pub fn selection(&self) -> &[ElementId] {
        self.selection.ids()
    }

    /// Primary selected element
    #[must_use]
    pub fn primary_selected(&self) -> Option<Element> {
        self.selection
            .primary()
            .and_then(|id| self.buffer.current(&id, &self.directory))
    }

    /// Check if edits are waiting to be saved
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.buffer.has_pending()
    }

    /// Check if a page is being fetched
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Loading
    }

    /// Check if a save is in flight
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.state == SessionState::Saving
    }

    /// Most recent gateway failure, cleared by the next successful round trip
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Synced elements
    #[must_use]
    pub fn directory(&self) -> &ElementDirectory {
        &self.directory
    }

    /// Buffered edits
    #[must_use]
    pub fn buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    /// Undo/redo log
    #[must_use]
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Clipboard contents
    #[must_use]
    pub fn clipboard(&self) -> &ClipboardSlot {
        &self.clipboard
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn active_page_id(&self) -> Result<Uuid> {
        match (&self.page, self.state.accepts_edits()) {
            (Some(page), true) => Ok(page.id),
            _ => Err(Error::NoActivePage),
        }
    }

    fn ensure_visible(&self, id: ElementId) -> Result<()> {
        self.active_page_id()?;
        match self.buffer.current(&id, &self.directory) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(id)),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.buffer.visible(&self.directory))
    }

    fn record_change(&mut self, label: &str, ids: Vec<ElementId>) {
        let snapshot = self.snapshot().with_label(label);
        self.history.push(snapshot);
        let page_id = self.page.as_ref().map(|p| p.id);
        self.events.publish(SessionEventType::Changed, page_id, ids);
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let remaps = self.buffer.reset_to(&snapshot.elements, &self.directory);
        for (old, new) in remaps {
            self.history.remap(old, new);
            self.selection.remap(old, new);
        }

        let visible: Vec<ElementId> = self
            .buffer
            .visible(&self.directory)
            .into_iter()
            .map(|e| e.id)
            .collect();
        if self.selection.retain(|id| visible.contains(id)) {
            self.publish_selection();
        }

        let page_id = self.page.as_ref().map(|p| p.id);
        self.events
            .publish(SessionEventType::HistoryMoved, page_id, Vec::new());
    }

    fn publish_selection(&mut self) {
        let page_id = self.page.as_ref().map(|p| p.id);
        let ids = self.selection.ids().to_vec();
        self.events
            .publish(SessionEventType::SelectionChanged, page_id, ids);
    }

    fn fail<T>(&mut self, operation: &'static str, err: Error) -> Result<T> {
        warn!(operation, error = %err, code = err.code(), "Session operation failed");
        self.last_error = Some(err.clone());
        Err(err)
    }
}

fn shift_z(z: i64, delta: i64) -> Result<i64> {
    z.checked_add(delta)
        .ok_or_else(|| Error::validation(format!("z-order {z} cannot move by {delta}")))
}

impl std::fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditingSession")
            .field("gateway", &self.gateway.name())
            .field("state", &self.state)
            .field("page", &self.page.as_ref().map(|p| p.id))
            .field("elements", &self.directory.len())
            .field("pending", &self.buffer.len())
            .finish()
    }
}
