//! Paginator: splits a block sequence into fixed-size pages with a footer on each.
//!
//! # Algorithm
//! 1. Reserve the worst-case footer height (reference line, note, "Page 999 of 999").
//! 2. Walk blocks in order with a running estimated height. If the next block would
//!    exceed the remaining budget and the current page already holds something,
//!    close the page; otherwise append.
//! 3. Once every block is placed the page count is known: back-fill `total_pages`
//!    and append one footer per page, with "Page i of N" when N > 1.
//!
//! Blocks are atomic. A block taller than a whole page sits alone on its own page
//! and overflows it rather than being split.

use serde::{Deserialize, Serialize};

use crate::document::blocks::{ContentBlock, Page, TextBlock};
use crate::document::reference::ReferenceId;
use crate::layout::geometry::RenderGeometry;
use crate::layout::measure::{block_height, Measure};

/// Spacing between the last body block and the footer rule.
const FOOTER_GAP: f32 = 24.0;

/// Shared footer content stamped onto every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterTemplate {
    pub support_contact: String,
    /// Optional instruction line, e.g. how to reply.
    pub note: Option<String>,
}

impl FooterTemplate {
    pub fn new(support_contact: impl Into<String>) -> Self {
        Self {
            support_contact: support_contact.into(),
            note: Some(
                "Mark your choices and fax this page back. Keep the reference code visible."
                    .to_string(),
            ),
        }
    }

    pub fn text(&self, reference: &ReferenceId, page_number: u32, total_pages: u32) -> String {
        let mut lines = vec![format!(
            "Reference: {reference}   |   Support: {}",
            self.support_contact
        )];
        if let Some(note) = self.note.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(note.to_string());
        }
        if total_pages > 1 {
            lines.push(format!("Page {page_number} of {total_pages}"));
        }
        lines.join("\n")
    }

    pub fn block(&self, reference: &ReferenceId, page_number: u32, total_pages: u32) -> ContentBlock {
        let mut block = TextBlock::new(self.text(reference, page_number, total_pages)).centered();
        block.margin_top = FOOTER_GAP;
        ContentBlock::Footer(block)
    }

    /// Height to hold back on every page, measured on the longest footer variant.
    pub fn reserved_height(&self, reference: &ReferenceId, geometry: &RenderGeometry) -> f32 {
        let widest = self.block(reference, 999, 999);
        block_height(&widest, geometry, Measure::Estimate)
            .max(block_height(&widest, geometry, Measure::Exact))
    }
}

pub fn paginate(
    blocks: &[ContentBlock],
    footer: &FooterTemplate,
    reference: &ReferenceId,
    geometry: &RenderGeometry,
) -> Vec<Page> {
    let budget = geometry.available_height(footer.reserved_height(reference, geometry));

    let mut pages: Vec<Vec<ContentBlock>> = Vec::new();
    let mut current: Vec<ContentBlock> = Vec::new();
    let mut used = 0.0_f32;

    // Footers are owned by the paginator; any supplied ones are replaced.
    for block in blocks.iter().filter(|b| !b.is_footer()) {
        let height = block_height(block, geometry, Measure::Estimate);
        if !current.is_empty() && used + height > budget {
            pages.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += height;
        current.push(block.clone());
    }
    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }

    let total = pages.len() as u32;
    pages
        .into_iter()
        .enumerate()
        .map(|(idx, mut content)| {
            let page_number = idx as u32 + 1;
            content.push(footer.block(reference, page_number, total));
            Page {
                content,
                page_number,
                total_pages: total,
            }
        })
        .collect()
}

/// Estimated body height of a page, as the paginator saw it.
pub fn estimated_body_height(page: &Page, geometry: &RenderGeometry) -> f32 {
    page.body()
        .map(|b| block_height(b, geometry, Measure::Estimate))
        .sum()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
