//! Selection
//!
//! Ordered set of selected element identities. The first entry is the
//! primary element shown in the property panel.

use crate::element::ElementId;

/// Ordered, duplicate-free set of selected elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<ElementId>,
}

impl Selection {
    /// Create an empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with a single element
    pub fn select(&mut self, id: ElementId) {
        self.ids.clear();
        self.ids.push(id);
    }

    /// Add or remove one element, keeping the rest
    ///
    /// Returns whether the element is selected afterwards.
    pub fn toggle(&mut self, id: ElementId) -> bool {
        if let Some(pos) = self.ids.iter().position(|s| *s == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Select every given element, in order
    pub fn select_all(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        self.ids.clear();
        for id in ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    /// Deselect everything
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Element shown in the property panel
    #[must_use]
    pub fn primary(&self) -> Option<ElementId> {
        self.ids.first().copied()
    }

    /// Selected identities in selection order
    #[must_use]
    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    /// Check if an element is selected
    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.ids.contains(id)
    }

    /// Get the number of selected elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keep only identities matching the predicate; returns whether anything was dropped
    pub fn retain(&mut self, mut keep: impl FnMut(&ElementId) -> bool) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| keep(id));
        self.ids.len() != before
    }

    /// Replace an identity in place
    pub fn remap(&mut self, old: ElementId, new: ElementId) {
        for id in &mut self.ids {
            if *id == old {
                *id = new;
            }
        }
    }
}
