use serde::{Deserialize, Serialize};

/// Fixed page geometry shared by every layout, pagination and render call.
///
/// All distances are in device pixels. Constructed once at startup and passed by
/// reference; nothing in the render path mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderGeometry {
    pub page_width: u32,
    pub page_height: u32,
    pub dpi: u32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    /// Body text size in pixels per em.
    pub default_font_size: f32,
}

/// Line height multiplier for text-like blocks.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Option rows are set slightly tighter than running text.
pub const OPTION_LINE_HEIGHT_FACTOR: f32 = 1.1;

impl Default for RenderGeometry {
    /// US letter at 254 dpi (8.5" × 11"), sized for legible fax reproduction.
    fn default() -> Self {
        Self {
            page_width: 2160,
            page_height: 2800,
            dpi: 254,
            margin_top: 60.0,
            margin_bottom: 60.0,
            margin_left: 80.0,
            margin_right: 80.0,
            default_font_size: 48.0,
        }
    }
}

impl RenderGeometry {
    /// Usable text width between the left and right margins.
    pub fn content_width(&self) -> f32 {
        self.page_width as f32 - self.margin_left - self.margin_right
    }

    /// Vertical budget for body content once the footer is reserved.
    pub fn available_height(&self, reserved_footer: f32) -> f32 {
        (self.page_height as f32 - self.margin_top - self.margin_bottom - reserved_footer).max(0.0)
    }

    /// Top edge of a footer of the given height, pinned to the bottom margin.
    pub fn footer_top(&self, footer_height: f32) -> f32 {
        self.page_height as f32 - self.margin_bottom - footer_height
    }

    /// Physical page size in PDF points (1/72 inch).
    pub fn page_size_points(&self) -> (f32, f32) {
        let dpi = self.dpi.max(1) as f32;
        (
            self.page_width as f32 * 72.0 / dpi,
            self.page_height as f32 * 72.0 / dpi,
        )
    }
}
