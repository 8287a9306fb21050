//! Change Buffer
//!
//! Local edits that the remote store has not confirmed yet. Each identity maps
//! to exactly one pending change:
//!
//! - `Create`: element that only exists locally, under a `Local` identity
//! - `Update`: copy-on-write of a persisted element
//! - `Delete`: tombstone for a persisted element
//!
//! Entries keep their insertion order so flushes are deterministic. Every
//! mutation stamps the touched entry with a fresh revision, which lets a
//! completed flush tell apart entries it submitted from entries edited while
//! the request was in flight.
//!
//! A flush happens in two halves: [`ChangeBuffer::prepare_flush`] reads the
//! buffer without touching it, and [`ChangeBuffer::complete_flush`] folds a
//! successful gateway response back in. A failed request never reaches the
//! second half, so the buffer is left exactly as it was.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::directory::ElementDirectory;
use crate::element::{Element, ElementId, ElementPatch, NewElement};
use crate::error::{Error, Result};
use crate::gateway::{BatchSaveResult, PersistenceGateway, SaveOperation};

/// Marker meaning "delete this element on the next flush"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tombstone {
    /// Element to delete
    pub id: ElementId,
    /// When the delete was requested
    pub deleted_at: DateTime<Utc>,
}

/// A pending change
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Never-synced element
    Create(Element),
    /// Edited copy of a persisted element
    Update(Element),
    /// Delete request for a persisted element
    Delete(Tombstone),
}

impl Change {
    /// Element state carried by the change, if any
    #[must_use]
    pub fn element(&self) -> Option<&Element> {
        match self {
            Self::Create(e) | Self::Update(e) => Some(e),
            Self::Delete(_) => None,
        }
    }

    fn element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Create(e) | Self::Update(e) => Some(e),
            Self::Delete(_) => None,
        }
    }

    /// Same intent, ignoring tombstone timestamps
    fn same_as(&self, other: &Change) -> bool {
        match (self, other) {
            (Self::Delete(_), Self::Delete(_)) => true,
            (Self::Create(a), Self::Create(b)) | (Self::Update(a), Self::Update(b)) => a == b,
            _ => false,
        }
    }
}

/// A buffered change with its identity and revision stamp
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    id: ElementId,
    change: Change,
    revision: u64,
}

impl BufferEntry {
    /// Identity the change applies to
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The pending change
    #[must_use]
    pub fn change(&self) -> &Change {
        &self.change
    }

    /// Revision stamp of the last mutation
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Operations of one flush, together with the revisions they were read at
#[derive(Debug, Clone, PartialEq)]
pub struct FlushBatch {
    /// Page the batch belongs to
    pub page_id: Uuid,
    /// Operations to submit, in buffer order
    pub operations: Vec<SaveOperation>,
    revisions: Vec<(ElementId, u64)>,
}

impl FlushBatch {
    /// Number of operations in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the batch is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn revision_of(&self, id: &ElementId) -> Option<u64> {
        self.revisions
            .iter()
            .find(|(rid, _)| rid == id)
            .map(|(_, rev)| *rev)
    }
}

/// Outcome of a completed flush
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Records created remotely
    pub created: usize,
    /// Records updated remotely
    pub updated: usize,
    /// Records soft-deleted remotely
    pub deleted: usize,
    /// Identity replacements, old to new, in the order they happened
    pub remaps: Vec<(ElementId, ElementId)>,
}

/// Buffered local edits of one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBuffer {
    entries: Vec<BufferEntry>,
    next_local: u64,
    revision: u64,
}

impl ChangeBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if anything is waiting to be flushed
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Get the number of pending entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries in flush order
    #[must_use]
    pub fn entries(&self) -> &[BufferEntry] {
        &self.entries
    }

    /// Pending change for an identity
    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<&Change> {
        self.position(id).map(|pos| &self.entries[pos].change)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Buffer a new element under a fresh local identity
    ///
    /// Without an explicit z-order the element lands on top of everything
    /// already on the page.
    pub fn add(
        &mut self,
        new: NewElement,
        page_id: Uuid,
        directory: &ElementDirectory,
    ) -> Result<ElementId> {
        new.validate()?;

        let z_index = match (new.z_index, self.max_z(directory)) {
            (Some(z), _) => z,
            (None, None) => 0,
            (None, Some(top)) => top
                .checked_add(1)
                .ok_or_else(|| Error::validation("no z-order left above the topmost element"))?,
        };
        let id = self.allocate_local_id();
        let element = Element::from_new(id, page_id, new, z_index);

        debug!(element_id = %id, kind = %element.kind, z_index, "Buffered create");
        self.push(id, Change::Create(element));
        Ok(id)
    }

    /// Apply a partial update, copying the persisted value on first write
    pub fn update(
        &mut self,
        id: ElementId,
        patch: &ElementPatch,
        directory: &ElementDirectory,
    ) -> Result<()> {
        patch.validate()?;

        if let Some(pos) = self.position(&id) {
            let revision = self.next_revision();
            let entry = &mut self.entries[pos];
            let element = entry.change.element_mut().ok_or(Error::NotFound(id))?;
            element.apply_patch(patch)?;
            entry.revision = revision;
            debug!(element_id = %id, "Merged update into pending entry");
            return Ok(());
        }

        let mut element = directory.get(&id).cloned().ok_or(Error::NotFound(id))?;
        element.apply_patch(patch)?;
        debug!(element_id = %id, "Buffered update");
        self.push(id, Change::Update(element));
        Ok(())
    }

    /// Delete an element
    ///
    /// A pending create is dropped outright since nothing exists remotely. A
    /// persisted element gets a tombstone, which replaces any pending update.
    pub fn remove(&mut self, id: ElementId, directory: &ElementDirectory) -> Result<()> {
        if let Some(pos) = self.position(&id) {
            match &self.entries[pos].change {
                Change::Delete(_) => return Err(Error::NotFound(id)),
                Change::Create(_) => {
                    self.entries.remove(pos);
                    debug!(element_id = %id, "Dropped pending create");
                }
                Change::Update(_) => {
                    let revision = self.next_revision();
                    self.entries[pos] = BufferEntry {
                        id,
                        change: Change::Delete(Tombstone {
                            id,
                            deleted_at: Utc::now(),
                        }),
                        revision,
                    };
                    debug!(element_id = %id, "Tombstone replaced pending update");
                }
            }
            return Ok(());
        }

        if !directory.contains(&id) {
            return Err(Error::NotFound(id));
        }
        debug!(element_id = %id, "Buffered delete");
        self.push(
            id,
            Change::Delete(Tombstone {
                id,
                deleted_at: Utc::now(),
            }),
        );
        Ok(())
    }

    /// Current value of an element as the user sees it
    #[must_use]
    pub fn current(&self, id: &ElementId, directory: &ElementDirectory) -> Option<Element> {
        match self.get(id) {
            Some(change) => change.element().cloned(),
            None => directory.get(id).cloned(),
        }
    }

    /// Live view of the page: synced elements overlaid with pending changes,
    /// tombstones excluded, in ascending z-order
    #[must_use]
    pub fn visible(&self, directory: &ElementDirectory) -> Vec<Element> {
        let mut elements: Vec<Element> = directory
            .all()
            .iter()
            .filter(|e| self.get(&e.id).is_none())
            .cloned()
            .collect();
        elements.extend(
            self.entries
                .iter()
                .filter_map(|entry| entry.change.element().cloned()),
        );
        elements.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        elements
    }

    /// Highest z-order across synced elements and pending creates/updates
    #[must_use]
    pub fn max_z(&self, directory: &ElementDirectory) -> Option<i64> {
        let pending = self
            .entries
            .iter()
            .filter_map(|entry| entry.change.element())
            .map(|e| e.z_index)
            .max();
        match (directory.max_z(), pending) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Lowest z-order across synced elements and pending creates/updates
    #[must_use]
    pub fn min_z(&self, directory: &ElementDirectory) -> Option<i64> {
        self.visible(directory).first().map(|e| e.z_index)
    }

    /// Rewrite the entries so that [`ChangeBuffer::visible`] equals `snapshot`
    ///
    /// Entries whose change is unaffected keep their revision. Persisted
    /// elements that an earlier flush already deleted come back as new local
    /// elements; the returned pairs list those identity replacements.
    pub fn reset_to(
        &mut self,
        snapshot: &[Element],
        directory: &ElementDirectory,
    ) -> Vec<(ElementId, ElementId)> {
        let mut remaps = Vec::new();
        let mut wanted: Vec<(ElementId, Change)> = Vec::new();

        for element in snapshot {
            if element.id.is_local() {
                wanted.push((element.id, Change::Create(element.clone())));
                continue;
            }
            match directory.get(&element.id) {
                Some(synced) if synced == element => {}
                Some(_) => wanted.push((element.id, Change::Update(element.clone()))),
                None => {
                    let local = self.allocate_local_id();
                    let mut element = element.clone();
                    debug!(old = %element.id, new = %local, "Re-creating element removed by an earlier save");
                    remaps.push((element.id, local));
                    element.id = local;
                    wanted.push((local, Change::Create(element)));
                }
            }
        }

        let kept: Vec<ElementId> = snapshot.iter().map(|e| e.id).collect();
        for element in directory.all() {
            if !kept.contains(&element.id) {
                wanted.push((
                    element.id,
                    Change::Delete(Tombstone {
                        id: element.id,
                        deleted_at: Utc::now(),
                    }),
                ));
            }
        }

        let order: Vec<ElementId> = self.entries.iter().map(|entry| entry.id).collect();
        let mut previous: HashMap<ElementId, BufferEntry> = self
            .entries
            .drain(..)
            .map(|entry| (entry.id, entry))
            .collect();
        let mut next = Vec::with_capacity(wanted.len());
        for (id, change) in wanted {
            match previous.remove(&id) {
                Some(old) if old.change.same_as(&change) => next.push(old),
                _ => {
                    let revision = self.next_revision();
                    next.push(BufferEntry {
                        id,
                        change,
                        revision,
                    });
                }
            }
        }
        // Stable order: surviving entries first, in their old relative order.
        next.sort_by_key(|entry| {
            order
                .iter()
                .position(|id| *id == entry.id)
                .unwrap_or(usize::MAX)
        });
        self.entries = next;
        remaps
    }

    /// Read the buffer into a batch for the gateway; `None` when nothing is pending
    #[must_use]
    pub fn prepare_flush(&self, page_id: Uuid) -> Option<FlushBatch> {
        if self.entries.is_empty() {
            return None;
        }

        let mut operations = Vec::with_capacity(self.entries.len());
        let mut revisions = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let operation = match (&entry.change, entry.id) {
                (Change::Create(element), local_id) => SaveOperation::Create {
                    local_id,
                    element: element.clone(),
                },
                (Change::Update(element), ElementId::Persisted(id)) => SaveOperation::Update {
                    id,
                    element: element.clone(),
                },
                (Change::Delete(_), ElementId::Persisted(id)) => SaveOperation::Delete { id },
                (change, id) => {
                    warn!(element_id = %id, ?change, "Skipping entry without a server identity");
                    continue;
                }
            };
            operations.push(operation);
            revisions.push((entry.id, entry.revision));
        }

        Some(FlushBatch {
            page_id,
            operations,
            revisions,
        })
    }

    /// Fold a successful gateway response back into the buffer and directory
    ///
    /// Entries untouched since [`ChangeBuffer::prepare_flush`] are cleared.
    /// Entries edited in the meantime stay pending, re-keyed to the server
    /// identity where one was assigned. A response that does not account for
    /// every submitted create is rejected and nothing is applied.
    pub fn complete_flush(
        &mut self,
        batch: &FlushBatch,
        result: BatchSaveResult,
        directory: &mut ElementDirectory,
    ) -> Result<FlushReport> {
        for operation in &batch.operations {
            if let SaveOperation::Create { local_id, .. } = operation {
                if result.created_for(local_id).is_none() {
                    return Err(Error::sync(
                        "batch_save",
                        format!("response is missing the record created for {local_id}"),
                    ));
                }
            }
        }

        let mut report = FlushReport {
            created: result.created_count(),
            updated: result.updated_count(),
            deleted: result.deleted.len(),
            remaps: Vec::new(),
        };

        for operation in &batch.operations {
            let target = operation.target();
            let submitted = batch.revision_of(&target);
            let pos = self.position(&target);
            let unchanged = pos.is_some_and(|p| Some(self.entries[p].revision) == submitted);

            match operation {
                SaveOperation::Create { local_id, .. } => {
                    let Some(server) = result.created_for(local_id).cloned() else {
                        continue;
                    };
                    let server_id = server.id;
                    match pos {
                        Some(p) if unchanged => {
                            self.entries.remove(p);
                        }
                        Some(p) => {
                            let revision = self.next_revision();
                            let entry = &mut self.entries[p];
                            if let Some(mut latest) = entry.change.element().cloned() {
                                latest.id = server_id;
                                latest.created_at = server.created_at;
                                entry.change = Change::Update(latest);
                            }
                            entry.id = server_id;
                            entry.revision = revision;
                        }
                        None => {
                            self.push(
                                server_id,
                                Change::Delete(Tombstone {
                                    id: server_id,
                                    deleted_at: Utc::now(),
                                }),
                            );
                        }
                    }
                    directory.upsert(server);
                    report.remaps.push((*local_id, server_id));
                }
                SaveOperation::Update { id, element } => {
                    let server = result
                        .updated_for(*id)
                        .cloned()
                        .unwrap_or_else(|| element.clone());
                    match pos {
                        Some(p) if unchanged => {
                            self.entries.remove(p);
                        }
                        Some(_) => {}
                        None => {
                            // The edit was reverted locally while in flight.
                            if let Some(previous) = directory.get(&target).cloned() {
                                self.push(target, Change::Update(previous));
                            }
                        }
                    }
                    directory.upsert(server);
                }
                SaveOperation::Delete { .. } => {
                    let survivor = match pos {
                        Some(p) if unchanged => {
                            self.entries.remove(p);
                            None
                        }
                        Some(p) => self.entries.remove(p).change.element().cloned(),
                        None => directory.get(&target).cloned(),
                    };
                    directory.remove(&target);
                    if let Some(mut element) = survivor {
                        let local = self.allocate_local_id();
                        element.id = local;
                        self.push(local, Change::Create(element));
                        report.remaps.push((target, local));
                    }
                }
            }
        }

        debug!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            remaining = self.entries.len(),
            "Flush reconciled"
        );
        Ok(report)
    }

    /// Submit all pending entries through the gateway
    ///
    /// On failure the buffer and directory are untouched.
    pub async fn flush<G>(
        &mut self,
        gateway: &G,
        page_id: Uuid,
        directory: &mut ElementDirectory,
    ) -> Result<FlushReport>
    where
        G: PersistenceGateway + ?Sized,
    {
        let Some(batch) = self.prepare_flush(page_id) else {
            return Ok(FlushReport::default());
        };
        let result = gateway
            .batch_save(page_id, batch.operations.clone())
            .await?;
        self.complete_flush(&batch, result, directory)
    }

    fn position(&self, id: &ElementId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == *id)
    }

    fn push(&mut self, id: ElementId, change: Change) {
        let revision = self.next_revision();
        self.entries.push(BufferEntry {
            id,
            change,
            revision,
        });
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn allocate_local_id(&mut self) -> ElementId {
        self.next_local += 1;
        ElementId::Local(self.next_local)
    }
}
