//! Trait for remote element stores

use uuid::Uuid;

use super::{BatchSaveResult, SaveOperation};
use crate::element::{Element, ElementPatch, NewElement, Page};
use crate::error::Result;

/// Trait for remote element stores
///
/// Timeouts and retries are the implementation's concern. Every method either
/// fully succeeds or leaves the remote state as it was.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Get the gateway name (for logging)
    fn name(&self) -> &'static str;

    /// Fetch page attributes
    async fn fetch_page(&self, page_id: Uuid) -> Result<Page>;

    /// Fetch the active elements of a page in ascending z-order
    async fn fetch_elements(&self, page_id: Uuid) -> Result<Vec<Element>>;

    /// Create one element
    async fn create_element(&self, page_id: Uuid, element: NewElement) -> Result<Element>;

    /// Apply a partial update to one element
    async fn update_element(&self, id: Uuid, patch: ElementPatch) -> Result<Element>;

    /// Stamp a deletion time, hiding the element from later fetches
    async fn soft_delete_element(&self, id: Uuid) -> Result<()>;

    /// Clear the deletion stamp
    async fn restore_element(&self, id: Uuid) -> Result<Element>;

    /// Copy an element with a positional offset, a new identity and reset usage counters
    async fn duplicate_element(&self, id: Uuid) -> Result<Element>;

    /// Apply buffered changes as one all-or-nothing batch
    async fn batch_save(
        &self,
        page_id: Uuid,
        operations: Vec<SaveOperation>,
    ) -> Result<BatchSaveResult>;
}
