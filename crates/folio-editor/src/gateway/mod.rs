//! Persistence Gateway
//!
//! Contract with the remote element store plus an in-process implementation.
//! The editing session only ever reaches the network through this trait.

mod memory;
mod traits;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::{Element, ElementId};

pub use memory::{MemoryGateway, DEFAULT_DUPLICATE_OFFSET_MM};
pub use traits::PersistenceGateway;

/// One buffered change submitted in a batch save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SaveOperation {
    /// Create an element that so far only exists locally
    Create {
        /// Temporary identity the result is matched back to
        local_id: ElementId,
        /// Full element state
        element: Element,
    },
    /// Overwrite a persisted element
    Update {
        /// Server identity
        id: Uuid,
        /// Full element state
        element: Element,
    },
    /// Soft-delete a persisted element
    Delete {
        /// Server identity
        id: Uuid,
    },
}

impl SaveOperation {
    /// Identity the operation targets, as known to the session
    #[must_use]
    pub fn target(&self) -> ElementId {
        match self {
            Self::Create { local_id, .. } => *local_id,
            Self::Update { id, .. } | Self::Delete { id } => ElementId::Persisted(*id),
        }
    }
}

/// Element created by a batch save, keyed by the identity it replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedElement {
    /// Temporary identity submitted by the session
    pub local_id: ElementId,
    /// Element with its server identity and timestamps
    pub element: Element,
}

/// Outcome of a batch save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSaveResult {
    /// Newly created records
    pub created: Vec<CreatedElement>,
    /// Updated records
    pub updated: Vec<Element>,
    /// Soft-deleted identities
    pub deleted: Vec<Uuid>,
}

impl BatchSaveResult {
    /// Number of created records
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Number of updated records
    #[must_use]
    pub fn updated_count(&self) -> usize {
        self.updated.len()
    }

    /// Server element created for a temporary identity
    #[must_use]
    pub fn created_for(&self, local_id: &ElementId) -> Option<&Element> {
        self.created
            .iter()
            .find(|c| c.local_id == *local_id)
            .map(|c| &c.element)
    }

    /// Server element returned for an update
    #[must_use]
    pub fn updated_for(&self, id: Uuid) -> Option<&Element> {
        self.updated
            .iter()
            .find(|e| e.id == ElementId::Persisted(id))
    }
}
