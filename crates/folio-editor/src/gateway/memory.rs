//! In-memory gateway
//!
//! Keeps pages and elements in process. Used by tests and the CLI, and as a
//! reference for what a remote store must do: soft-deleted rows are kept for
//! restore, batches apply all-or-nothing, duplicates get a fresh identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{BatchSaveResult, CreatedElement, PersistenceGateway, SaveOperation};
use crate::element::{Element, ElementId, ElementPatch, NewElement, Page};
use crate::error::{Error, Result};

/// Default offset applied to duplicates, in millimeters
pub const DEFAULT_DUPLICATE_OFFSET_MM: f64 = 10.0;

#[derive(Debug, Default)]
struct State {
    pages: HashMap<Uuid, Page>,
    elements: Vec<Element>,
    batches: Vec<Vec<SaveOperation>>,
    fail_next: usize,
    offline: bool,
}

impl State {
    fn check(&mut self, operation: &'static str) -> Result<()> {
        if self.offline {
            return Err(Error::sync(operation, "gateway offline"));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(Error::sync(operation, "injected failure"));
        }
        Ok(())
    }

    fn find(&self, id: Uuid) -> Option<usize> {
        let id = ElementId::Persisted(id);
        self.elements.iter().position(|e| e.id == id)
    }

    fn find_active(&self, id: Uuid) -> Result<usize> {
        self.find(id)
            .filter(|&pos| self.elements[pos].is_active())
            .ok_or(Error::NotFound(ElementId::Persisted(id)))
    }

    fn next_z(&self, page_id: Uuid) -> i64 {
        self.elements
            .iter()
            .filter(|e| e.page_id == page_id && e.is_active())
            .map(|e| e.z_index)
            .max()
            .map_or(0, |z| z.saturating_add(1))
    }
}

/// Gateway backed by process memory
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
    duplicate_offset: f64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Create an empty gateway
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            duplicate_offset: DEFAULT_DUPLICATE_OFFSET_MM,
        }
    }

    /// Configure the offset applied to duplicates
    #[must_use]
    pub fn with_duplicate_offset(mut self, offset: f64) -> Self {
        self.duplicate_offset = offset;
        self
    }

    /// Register a page and its initial elements, returning them as persisted
    pub fn seed(&self, page: Page, elements: Vec<NewElement>) -> Vec<Element> {
        let mut state = self.lock();
        let page_id = page.id;
        state.pages.insert(page_id, page);

        elements
            .into_iter()
            .map(|new| {
                let z = new.z_index.unwrap_or_else(|| state.next_z(page_id));
                let element =
                    Element::from_new(ElementId::Persisted(Uuid::new_v4()), page_id, new, z);
                state.elements.push(element.clone());
                element
            })
            .collect()
    }

    /// Make the next `count` calls fail with a sync error
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Make every call fail until switched back
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Batches accepted so far, oldest first
    #[must_use]
    pub fn submitted_batches(&self) -> Vec<Vec<SaveOperation>> {
        self.lock().batches.clone()
    }

    /// Stored element, soft-deleted or not
    #[must_use]
    pub fn stored(&self, id: Uuid) -> Option<Element> {
        let state = self.lock();
        state.find(id).map(|pos| state.elements[pos].clone())
    }

    /// Number of stored elements on a page, soft-deleted included
    #[must_use]
    pub fn stored_count(&self, page_id: Uuid) -> usize {
        self.lock()
            .elements
            .iter()
            .filter(|e| e.page_id == page_id)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn reset_usage(metadata: &mut Option<serde_json::Value>) {
    if let Some(serde_json::Value::Object(map)) = metadata {
        if map.contains_key("usage_count") {
            map.insert("usage_count".to_string(), serde_json::json!(0));
        }
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_page(&self, page_id: Uuid) -> Result<Page> {
        let mut state = self.lock();
        state.check("fetch_page")?;
        state
            .pages
            .get(&page_id)
            .cloned()
            .ok_or(Error::PageNotFound(page_id))
    }

    async fn fetch_elements(&self, page_id: Uuid) -> Result<Vec<Element>> {
        let mut state = self.lock();
        state.check("fetch_elements")?;
        if !state.pages.contains_key(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }

        let mut elements: Vec<Element> = state
            .elements
            .iter()
            .filter(|e| e.page_id == page_id && e.is_active())
            .cloned()
            .collect();
        elements.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        Ok(elements)
    }

    async fn create_element(&self, page_id: Uuid, element: NewElement) -> Result<Element> {
        let mut state = self.lock();
        state.check("create_element")?;
        if !state.pages.contains_key(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        element.validate()?;

        let z = element.z_index.unwrap_or_else(|| state.next_z(page_id));
        let created =
            Element::from_new(ElementId::Persisted(Uuid::new_v4()), page_id, element, z);
        state.elements.push(created.clone());
        Ok(created)
    }

    async fn update_element(&self, id: Uuid, patch: ElementPatch) -> Result<Element> {
        let mut state = self.lock();
        state.check("update_element")?;
        let pos = state.find_active(id)?;
        state.elements[pos].apply_patch(&patch)?;
        Ok(state.elements[pos].clone())
    }

    async fn soft_delete_element(&self, id: Uuid) -> Result<()> {
        let mut state = self.lock();
        state.check("soft_delete_element")?;
        let pos = state.find_active(id)?;
        state.elements[pos].soft_delete(Utc::now());
        Ok(())
    }

    async fn restore_element(&self, id: Uuid) -> Result<Element> {
        let mut state = self.lock();
        state.check("restore_element")?;
        let pos = state
            .find(id)
            .ok_or(Error::NotFound(ElementId::Persisted(id)))?;
        if !state.elements[pos].is_active() {
            state.elements[pos].restore();
        }
        Ok(state.elements[pos].clone())
    }

    async fn duplicate_element(&self, id: Uuid) -> Result<Element> {
        let mut state = self.lock();
        state.check("duplicate_element")?;
        let pos = state.find_active(id)?;

        let source = &state.elements[pos];
        let now = Utc::now();
        let mut copy = source.clone();
        copy.id = ElementId::Persisted(Uuid::new_v4());
        copy.position = source.position.offset(self.duplicate_offset, self.duplicate_offset);
        copy.z_index = state.next_z(source.page_id);
        copy.created_at = now;
        copy.updated_at = now;
        reset_usage(&mut copy.metadata);

        state.elements.push(copy.clone());
        Ok(copy)
    }

    async fn batch_save(
        &self,
        page_id: Uuid,
        operations: Vec<SaveOperation>,
    ) -> Result<BatchSaveResult> {
        let mut state = self.lock();
        state.check("batch_save")?;
        if !state.pages.contains_key(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }

        // Work on a copy so a rejected operation leaves the store untouched.
        let mut elements = state.elements.clone();
        let mut result = BatchSaveResult::default();
        let now = Utc::now();

        for operation in &operations {
            match operation {
                SaveOperation::Create { local_id, element } => {
                    let mut created = element.clone();
                    created.id = ElementId::Persisted(Uuid::new_v4());
                    created.page_id = page_id;
                    created.created_at = now;
                    created.updated_at = now;
                    elements.push(created.clone());
                    result.created.push(CreatedElement {
                        local_id: *local_id,
                        element: created,
                    });
                }
                SaveOperation::Update { id, element } => {
                    let target = ElementId::Persisted(*id);
                    let stored = elements
                        .iter_mut()
                        .find(|e| e.id == target && e.is_active())
                        .ok_or(Error::NotFound(target))?;
                    let created_at = stored.created_at;
                    *stored = element.clone();
                    stored.id = target;
                    stored.page_id = page_id;
                    stored.created_at = created_at;
                    stored.updated_at = now;
                    result.updated.push(stored.clone());
                }
                SaveOperation::Delete { id } => {
                    let target = ElementId::Persisted(*id);
                    let stored = elements
                        .iter_mut()
                        .find(|e| e.id == target && e.is_active())
                        .ok_or(Error::NotFound(target))?;
                    stored.soft_delete(now);
                    result.deleted.push(*id);
                }
            }
        }

        debug!(
            page_id = %page_id,
            created = result.created_count(),
            updated = result.updated_count(),
            deleted = result.deleted.len(),
            "Batch applied"
        );
        state.elements = elements;
        state.batches.push(operations);
        Ok(result)
    }
}
