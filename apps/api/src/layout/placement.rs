//! Vertical placement plan for one page.
//!
//! A single cursor walks body blocks top-down; footers are measured separately and
//! pinned so their top sits at `page_height - margin_bottom - footer_height` no matter
//! how much body content precedes them.

use crate::document::blocks::Page;
use crate::layout::geometry::RenderGeometry;
use crate::layout::measure::{content_height, footer_height, margins, Measure};

/// Where a block's drawing area lands. `top` is after its top margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Index into `Page::content`.
    pub index: usize,
    pub top: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub body: Vec<Placement>,
    pub footers: Vec<Placement>,
    pub footer_top: f32,
    pub footer_height: f32,
    /// Cursor position after the last body block (bottom margin included).
    pub content_bottom: f32,
}

impl PagePlan {
    /// True when body content runs into the footer area.
    pub fn overflows(&self) -> bool {
        self.content_bottom > self.footer_top + 0.5
    }
}

pub fn plan_page(page: &Page, geometry: &RenderGeometry) -> PagePlan {
    let mut body = Vec::new();
    let mut y = geometry.margin_top;

    for (index, block) in page.content.iter().enumerate() {
        if block.is_footer() {
            continue;
        }
        let (top, bottom) = margins(block);
        y += top;
        let height = content_height(block, geometry, Measure::Exact);
        body.push(Placement { index, top: y, height });
        y += height + bottom;
    }

    let footer_height = footer_height(&page.content, geometry, Measure::Exact);
    let footer_top = geometry.footer_top(footer_height);

    let mut footers = Vec::new();
    let mut fy = footer_top;
    for (index, block) in page.content.iter().enumerate() {
        if !block.is_footer() {
            continue;
        }
        let (top, bottom) = margins(block);
        fy += top;
        let height = content_height(block, geometry, Measure::Exact);
        footers.push(Placement {
            index,
            top: fy,
            height,
        });
        fy += height + bottom;
    }

    PagePlan {
        body,
        footers,
        footer_top,
        footer_height,
        content_bottom: y,
    }
}
