//! Millimeter / pixel conversion
//!
//! Millimeters are the stored unit. Pixels depend on the output resolution
//! and are only ever computed for display.

use serde::{Deserialize, Serialize};

use crate::element::Element;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Reference resolution of a CSS screen
pub const SCREEN_DPI: f64 = 96.0;

/// Resolution used for print output
pub const PRINT_DPI: f64 = 300.0;

/// Convert millimeters to pixels at a resolution
#[must_use]
pub fn mm_to_px(mm: f64, dpi: f64) -> f64 {
    mm / MM_PER_INCH * dpi
}

/// Convert pixels at a resolution to millimeters
#[must_use]
pub fn px_to_mm(px: f64, dpi: f64) -> f64 {
    px * MM_PER_INCH / dpi
}

/// Axis-aligned rectangle in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl PixelRect {
    /// Check if a point falls inside the rectangle (edges included)
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

impl Element {
    /// Unrotated bounds of the element at a resolution
    #[must_use]
    pub fn pixel_rect(&self, dpi: f64) -> PixelRect {
        PixelRect {
            x: mm_to_px(self.position.x, dpi),
            y: mm_to_px(self.position.y, dpi),
            width: mm_to_px(self.size.width, dpi),
            height: mm_to_px(self.size.height, dpi),
        }
    }
}
