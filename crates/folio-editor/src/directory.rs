//! Element Directory
//!
//! The last-known-synced set of active elements of the open page.

use std::collections::HashMap;

use uuid::Uuid;

use crate::element::{Element, ElementId, ElementKind};

/// Synced elements of one page with identity lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementDirectory {
    page_id: Option<Uuid>,
    elements: Vec<Element>,
    index: HashMap<ElementId, usize>,
}

impl ElementDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Page the directory was loaded for
    #[must_use]
    pub fn page_id(&self) -> Option<Uuid> {
        self.page_id
    }

    /// Replace the whole set with the elements fetched for a page
    ///
    /// Soft-deleted entries are dropped; the rest is kept in ascending z-order.
    pub fn replace_all(&mut self, page_id: Uuid, elements: Vec<Element>) {
        self.page_id = Some(page_id);
        self.elements = elements.into_iter().filter(Element::is_active).collect();
        self.sort();
    }

    /// Get an element by identity
    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.index.get(id).map(|&pos| &self.elements[pos])
    }

    /// Check if an identity is present
    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.index.contains_key(id)
    }

    /// All elements in ascending z-order
    #[must_use]
    pub fn all(&self) -> &[Element] {
        &self.elements
    }

    /// Elements of one kind, in ascending z-order
    pub fn by_kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(move |e| e.kind == kind)
    }

    /// Highest z-order present
    #[must_use]
    pub fn max_z(&self) -> Option<i64> {
        self.elements.iter().map(|e| e.z_index).max()
    }

    /// Get the number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Insert an element, replacing any entry with the same identity
    ///
    /// Soft-deleted elements are never admitted.
    pub fn upsert(&mut self, element: Element) {
        if !element.is_active() {
            self.remove(&element.id);
            return;
        }
        match self.index.get(&element.id) {
            Some(&pos) => self.elements[pos] = element,
            None => self.elements.push(element),
        }
        self.sort();
    }

    /// Remove an element by identity
    pub fn remove(&mut self, id: &ElementId) -> Option<Element> {
        let pos = self.index.get(id).copied()?;
        let removed = self.elements.remove(pos);
        self.reindex();
        Some(removed)
    }

    fn sort(&mut self) {
        self.elements
            .sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .elements
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.id, pos))
            .collect();
    }
}
