//! Clipboard
//!
//! Single slot holding a deep copy of one element for paste.

use crate::element::{Element, NewElement};

/// Default paste offset on both axes, in millimeters
pub const DEFAULT_PASTE_OFFSET_MM: f64 = 10.0;

/// Single-slot copy/paste holder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipboardSlot {
    content: Option<Element>,
}

impl ClipboardSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of an element, replacing the previous content
    pub fn copy(&mut self, element: &Element) {
        self.content = Some(element.clone());
    }

    /// Element currently held
    #[must_use]
    pub fn content(&self) -> Option<&Element> {
        self.content.as_ref()
    }

    /// Check if the slot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    /// Creation payload for a paste: a fresh copy of the held element shifted
    /// by `offset` on both axes, with z-order left to the buffer
    ///
    /// Every call starts again from the held element, so repeated pastes land
    /// at the same offset rather than drifting.
    #[must_use]
    pub fn paste(&self, offset: f64) -> Option<NewElement> {
        let source = self.content.as_ref()?;
        let mut new = source.to_new();
        new.position = source.position.offset(offset, offset);
        Some(new)
    }

    /// Empty the slot
    pub fn clear(&mut self) {
        self.content = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementId, NewElement, Position, Size};
    use serde_json::json;
    use uuid::Uuid;

    fn source() -> Element {
        Element::from_new(
            ElementId::Local(1),
            Uuid::nil(),
            NewElement::text("note", Position::new(30.0, 40.0), Size::new(60.0, 20.0))
                .with_style(json!({ "color": "teal" }))
                .with_z_index(7),
            7,
        )
    }

    #[test]
    fn test_empty_slot_pastes_nothing() {
        let slot = ClipboardSlot::new();
        assert!(slot.is_empty());
        assert!(slot.paste(DEFAULT_PASTE_OFFSET_MM).is_none());
    }

    #[test]
    fn test_paste_offsets_from_source() {
        let mut slot = ClipboardSlot::new();
        slot.copy(&source());

        let first = slot.paste(DEFAULT_PASTE_OFFSET_MM).unwrap();
        let second = slot.paste(DEFAULT_PASTE_OFFSET_MM).unwrap();

        assert_eq!(first.position, Position::new(40.0, 50.0));
        assert_eq!(second.position, Position::new(40.0, 50.0));
        assert_eq!(first.z_index, None);
        assert_eq!(first.content, json!({ "text": "note" }));
        assert_eq!(first.style, json!({ "color": "teal" }));
    }

    #[test]
    fn test_copy_is_detached_from_source() {
        let mut element = source();
        let mut slot = ClipboardSlot::new();
        slot.copy(&element);

        element.content = json!({ "text": "changed" });
        assert_eq!(slot.content().unwrap().content, json!({ "text": "note" }));

        slot.clear();
        assert!(slot.is_empty());
    }
}
