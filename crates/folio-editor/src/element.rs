//! Page and Element Types
//!
//! This module defines the data model of a notebook page.
//! A page holds visual elements (text, images, shapes, emoji, stickers and
//! mood trackers) placed at millimeter coordinates. Millimeters are the
//! canonical unit; pixel geometry is derived on demand (see [`crate::units`]).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A notebook page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier
    pub id: Uuid,

    /// Notebook that owns this page
    pub notebook_id: Uuid,

    /// 1-based position of the page inside its notebook
    pub page_number: u32,

    /// Whether this page is a user-designed cover
    #[serde(default)]
    pub is_custom_cover: bool,
}

impl Page {
    /// Create a new page in a notebook
    #[must_use]
    pub fn new(notebook_id: Uuid, page_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            notebook_id,
            page_number,
            is_custom_cover: false,
        }
    }

    /// Create with a specific ID
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Mark the page as a custom cover
    #[must_use]
    pub fn as_cover(mut self) -> Self {
        self.is_custom_cover = true;
        self
    }
}

/// Identity of an element within a page
///
/// Elements that were never synced carry a `Local` identity handed out by the
/// change buffer; the remote store assigns `Persisted` identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementId {
    /// Temporary identity, unique within one editing session
    Local(u64),
    /// Server-assigned identity
    Persisted(Uuid),
}

impl ElementId {
    /// Check if this identity was assigned locally
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Server identity, if persisted
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl From<Uuid> for ElementId {
    fn from(id: Uuid) -> Self {
        Self::Persisted(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(n) => write!(f, "local-{n}"),
            Self::Persisted(id) => write!(f, "{id}"),
        }
    }
}

/// Element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    /// Rich text block
    Text,
    /// Raster image
    Image,
    /// Vector shape (rectangle, ellipse, line...)
    Shape,
    /// Single emoji glyph
    Emoji,
    /// Sticker artwork
    Sticker,
    /// Mood tracker widget
    MoodTracker,
}

impl ElementKind {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Shape => "shape",
            Self::Emoji => "emoji",
            Self::Sticker => "sticker",
            Self::MoodTracker => "moodTracker",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-left corner of an element, in millimeters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset from the page's left edge
    pub x: f64,
    /// Vertical offset from the page's top edge
    pub y: f64,
}

impl Position {
    /// Create a position
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Shift by a delta on both axes
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(Error::validation("position must be finite"));
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(Error::validation(format!(
                "position must be non-negative, got ({}, {})",
                self.x, self.y
            )));
        }
        Ok(())
    }
}

/// Element extent, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent
    pub width: f64,
    /// Vertical extent
    pub height: f64,
}

impl Size {
    /// Create a size
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn validate(&self) -> Result<()> {
        if !self.width.is_finite() || !self.height.is_finite() {
            return Err(Error::validation("size must be finite"));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::validation(format!(
                "size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

fn validate_rotation(rotation: f64) -> Result<()> {
    if rotation.is_finite() {
        Ok(())
    } else {
        Err(Error::validation("rotation must be finite"))
    }
}

/// Soft-delete state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Part of the active set
    Active,
    /// Soft-deleted, kept remotely for restore
    Deleted {
        /// When the element was deleted
        deleted_at: DateTime<Utc>,
    },
}

impl Lifecycle {
    /// Check if the element belongs to the active set
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Deletion timestamp, if soft-deleted
    #[must_use]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { deleted_at } => Some(*deleted_at),
        }
    }
}

/// A placed visual element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element identity
    pub id: ElementId,

    /// Page this element is placed on
    pub page_id: Uuid,

    /// Element kind
    pub kind: ElementKind,

    /// Top-left corner in millimeters
    pub position: Position,

    /// Extent in millimeters
    pub size: Size,

    /// Clockwise rotation in degrees
    #[serde(default)]
    pub rotation: f64,

    /// Paint and hit-test order, higher is on top
    pub z_index: i64,

    /// Kind-specific payload (text runs, image source, emoji code...)
    #[serde(default)]
    pub content: serde_json::Value,

    /// Visual style (colors, fonts, borders...)
    #[serde(default)]
    pub style: serde_json::Value,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Soft-delete state
    pub lifecycle: Lifecycle,

    /// When the element was created
    pub created_at: DateTime<Utc>,

    /// When the element was last modified
    pub updated_at: DateTime<Utc>,
}

impl Element {
    /// Build an element from a creation payload
    #[must_use]
    pub fn from_new(id: ElementId, page_id: Uuid, new: NewElement, z_index: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            page_id,
            kind: new.kind,
            position: new.position,
            size: new.size,
            rotation: new.rotation,
            z_index,
            content: new.content,
            style: new.style,
            metadata: new.metadata,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the element belongs to the active set
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Mark the element as soft-deleted
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.lifecycle = Lifecycle::Deleted { deleted_at: at };
        self.updated_at = at;
    }

    /// Clear the soft-delete marker
    pub fn restore(&mut self) {
        self.lifecycle = Lifecycle::Active;
        self.updated_at = Utc::now();
    }

    /// Apply a validated partial update and re-stamp the modification time
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> Result<()> {
        patch.validate()?;

        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(z_index) = patch.z_index {
            self.z_index = z_index;
        }
        if let Some(content) = &patch.content {
            merge_json(&mut self.content, content);
        }
        if let Some(style) = &patch.style {
            merge_json(&mut self.style, style);
        }
        if let Some(metadata) = &patch.metadata {
            match &mut self.metadata {
                Some(existing) => merge_json(existing, metadata),
                None => self.metadata = Some(metadata.clone()),
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Convert back into a creation payload, keeping geometry and payloads
    #[must_use]
    pub fn to_new(&self) -> NewElement {
        NewElement {
            kind: self.kind,
            position: self.position,
            size: self.size,
            rotation: self.rotation,
            z_index: None,
            content: self.content.clone(),
            style: self.style.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Shallow JSON merge: object fields are merged key by key and a `null`
/// field removes the key; anything else replaces the target.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Payload for creating an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewElement {
    /// Element kind
    pub kind: ElementKind,
    /// Top-left corner in millimeters
    pub position: Position,
    /// Extent in millimeters
    pub size: Size,
    /// Rotation in degrees
    #[serde(default)]
    pub rotation: f64,
    /// Explicit z-order; placed on top when absent
    #[serde(default)]
    pub z_index: Option<i64>,
    /// Kind-specific payload
    #[serde(default)]
    pub content: serde_json::Value,
    /// Visual style
    #[serde(default)]
    pub style: serde_json::Value,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewElement {
    /// Create a payload with geometry only
    #[must_use]
    pub fn new(kind: ElementKind, position: Position, size: Size) -> Self {
        Self {
            kind,
            position,
            size,
            rotation: 0.0,
            z_index: None,
            content: serde_json::json!({}),
            style: serde_json::json!({}),
            metadata: None,
        }
    }

    /// Create a text block
    #[must_use]
    pub fn text(text: impl Into<String>, position: Position, size: Size) -> Self {
        Self::new(ElementKind::Text, position, size)
            .with_content(serde_json::json!({ "text": text.into() }))
    }

    /// Create an emoji
    #[must_use]
    pub fn emoji(glyph: impl Into<String>, position: Position, size: Size) -> Self {
        Self::new(ElementKind::Emoji, position, size)
            .with_content(serde_json::json!({ "glyph": glyph.into() }))
    }

    /// Set the content payload
    #[must_use]
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    /// Set the style payload
    #[must_use]
    pub fn with_style(mut self, style: serde_json::Value) -> Self {
        self.style = style;
        self
    }

    /// Set the rotation
    #[must_use]
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set an explicit z-order
    #[must_use]
    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Reject malformed geometry
    pub fn validate(&self) -> Result<()> {
        self.position.validate()?;
        self.size.validate()?;
        validate_rotation(self.rotation)
    }
}

/// Partial update of an element; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    /// New position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// New size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    /// New rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// New z-order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Content fields to merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Style fields to merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
    /// Metadata fields to merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ElementPatch {
    /// Create an empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to a position
    #[must_use]
    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    /// Resize
    #[must_use]
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    /// Rotate
    #[must_use]
    pub fn rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Set z-order
    #[must_use]
    pub fn z_index(mut self, z_index: i64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Merge content fields
    #[must_use]
    pub fn content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }

    /// Merge style fields
    #[must_use]
    pub fn style(mut self, style: serde_json::Value) -> Self {
        self.style = Some(style);
        self
    }

    /// Merge metadata fields
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check if the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject malformed geometry
    pub fn validate(&self) -> Result<()> {
        if let Some(position) = &self.position {
            position.validate()?;
        }
        if let Some(size) = &self.size {
            size.validate()?;
        }
        if let Some(rotation) = self.rotation {
            validate_rotation(rotation)?;
        }
        Ok(())
    }
}
