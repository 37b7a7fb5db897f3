//! Block height rules used by both pagination and placement.
//!
//! The paginator calls these in `Measure::Estimate` mode (average-width line counts),
//! the placement planner in `Measure::Exact` mode (per-glyph wrapping). Both modes share
//! every other rule, so the only divergence between look-ahead and the real page is
//! the line count of wrapped text.

use crate::document::blocks::{ContentBlock, FontWeight, OptionList, TextBlock};
use crate::layout::font_metrics::{get_metrics, FontFace};
use crate::layout::geometry::{RenderGeometry, LINE_HEIGHT_FACTOR, OPTION_LINE_HEIGHT_FACTOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Estimate,
    Exact,
}

/// Which text-like variant a `TextBlock` came from; drives default size and weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Body,
    Header,
    Footer,
}

const HEADER_SCALE: f32 = 1.4;
const SMALL_SCALE: f32 = 0.75;
/// Marker column width for option rows, in ems of the option font size.
const MARKER_COLUMN_EM: f32 = 1.5;

/// Font face, size and line height after applying block overrides to role defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub face: FontFace,
    pub size: f32,
    pub line_height: f32,
}

pub fn text_style(role: TextRole, block: &TextBlock, geometry: &RenderGeometry) -> TextStyle {
    let (default_size, default_weight) = match role {
        TextRole::Body => (geometry.default_font_size, FontWeight::Regular),
        TextRole::Header => (geometry.default_font_size * HEADER_SCALE, FontWeight::Bold),
        TextRole::Footer => (geometry.default_font_size * SMALL_SCALE, FontWeight::Regular),
    };
    let size = block.font_size.filter(|s| *s > 0.0).unwrap_or(default_size);
    let face = match block.weight.unwrap_or(default_weight) {
        FontWeight::Regular => FontFace::Sans,
        FontWeight::Bold => FontFace::SansBold,
    };
    TextStyle {
        face,
        size,
        line_height: size * LINE_HEIGHT_FACTOR,
    }
}

pub fn option_style(list: &OptionList, geometry: &RenderGeometry) -> TextStyle {
    let size = list
        .font_size
        .filter(|s| *s > 0.0)
        .unwrap_or(geometry.default_font_size);
    TextStyle {
        face: FontFace::Sans,
        size,
        line_height: size * OPTION_LINE_HEIGHT_FACTOR,
    }
}

pub fn caption_style(geometry: &RenderGeometry) -> TextStyle {
    let size = geometry.default_font_size * SMALL_SCALE;
    TextStyle {
        face: FontFace::Sans,
        size,
        line_height: size * LINE_HEIGHT_FACTOR,
    }
}

pub fn marker_column_width(style: &TextStyle) -> f32 {
    style.size * MARKER_COLUMN_EM
}

pub fn line_count(text: &str, style: &TextStyle, max_width: f32, mode: Measure) -> usize {
    let metrics = get_metrics(style.face);
    match mode {
        Measure::Exact => metrics.wrap(text, style.size, max_width).len(),
        Measure::Estimate => metrics.estimated_lines(text, style.size, max_width),
    }
}

/// `(margin_top, margin_bottom)` of a block. Spacers and footers carry none.
pub fn margins(block: &ContentBlock) -> (f32, f32) {
    match block {
        ContentBlock::Text(t) | ContentBlock::Header(t) | ContentBlock::Footer(t) => {
            (t.margin_top, t.margin_bottom)
        }
        ContentBlock::OptionList(l) => (l.margin_top, l.margin_bottom),
        ContentBlock::Barcode(b) => (b.margin_top, b.margin_bottom),
        ContentBlock::Image(i) => (i.margin_top, i.margin_bottom),
        ContentBlock::BlankSpace(_) => (0.0, 0.0),
    }
}

/// Height of the block's own drawing area, margins excluded.
pub fn content_height(block: &ContentBlock, geometry: &RenderGeometry, mode: Measure) -> f32 {
    let width = geometry.content_width();
    match block {
        ContentBlock::Text(t) => text_height(TextRole::Body, t, geometry, mode),
        ContentBlock::Header(t) => text_height(TextRole::Header, t, geometry, mode),
        ContentBlock::Footer(t) => text_height(TextRole::Footer, t, geometry, mode),
        ContentBlock::OptionList(list) => {
            let style = option_style(list, geometry);
            let column = (width - marker_column_width(&style)).max(style.size);
            list.options
                .iter()
                .map(|o| line_count(&o.display_text(), &style, column, mode) as f32)
                .sum::<f32>()
                * style.line_height
        }
        ContentBlock::Barcode(b) => b.size.max(0.0),
        ContentBlock::Image(img) => {
            let caption = img
                .caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(|c| {
                    let style = caption_style(geometry);
                    line_count(c, &style, width, mode) as f32 * style.line_height
                })
                .unwrap_or(0.0);
            img.height.max(0.0) + caption
        }
        ContentBlock::BlankSpace(s) => s.height.max(0.0),
    }
}

fn text_height(role: TextRole, block: &TextBlock, geometry: &RenderGeometry, mode: Measure) -> f32 {
    let style = text_style(role, block, geometry);
    line_count(&block.text, &style, geometry.content_width(), mode) as f32 * style.line_height
}

/// Full vertical advance of a block: margins plus content.
pub fn block_height(block: &ContentBlock, geometry: &RenderGeometry, mode: Measure) -> f32 {
    let (top, bottom) = margins(block);
    top + content_height(block, geometry, mode) + bottom
}

/// Combined height of every footer block on a page.
pub fn footer_height<'a, I>(blocks: I, geometry: &RenderGeometry, mode: Measure) -> f32
where
    I: IntoIterator<Item = &'a ContentBlock>,
{
    blocks
        .into_iter()
        .filter(|b| b.is_footer())
        .map(|b| block_height(b, geometry, mode))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::blocks::{BarcodeBlock, ChoiceMode, OptionItem};

    fn geometry() -> RenderGeometry {
        RenderGeometry::default()
    }

    #[test]
    fn test_single_line_text_height_is_one_line() {
        let block = ContentBlock::text("Hello");
        let h = block_height(&block, &geometry(), Measure::Exact);
        assert!((h - 48.0 * 1.2).abs() < 1e-3);
    }

    #[test]
    fn test_margins_add_to_advance() {
        let block = ContentBlock::Text(TextBlock::new("Hello").margins(10.0, 25.0));
        let h = block_height(&block, &geometry(), Measure::Exact);
        assert!((h - (35.0 + 48.0 * 1.2)).abs() < 1e-3);
    }

    #[test]
    fn test_header_defaults_to_bold_and_larger() {
        let style = text_style(TextRole::Header, &TextBlock::new("x"), &geometry());
        assert_eq!(style.face, FontFace::SansBold);
        assert!(style.size > geometry().default_font_size);
    }

    #[test]
    fn test_explicit_weight_overrides_role_default() {
        let mut block = TextBlock::new("x");
        block.weight = Some(FontWeight::Regular);
        let style = text_style(TextRole::Header, &block, &geometry());
        assert_eq!(style.face, FontFace::Sans);
    }

    #[test]
    fn test_option_list_height_sums_wrapped_rows() {
        let long = "word ".repeat(120);
        let list = OptionList::new(
            ChoiceMode::Circle,
            vec![OptionItem::new("A", "Short"), OptionItem::new("B", long.trim())],
        );
        let style = option_style(&list, &geometry());
        let h = content_height(&ContentBlock::OptionList(list), &geometry(), Measure::Exact);
        let rows = (h / style.line_height).round() as usize;
        assert!(rows >= 3, "long option should wrap, got {rows} rows");
    }

    #[test]
    fn test_barcode_height_is_declared_size() {
        let mut b = BarcodeBlock::qr("X");
        b.size = 250.0;
        b.margin_top = 5.0;
        assert_eq!(
            block_height(&ContentBlock::Barcode(b), &geometry(), Measure::Estimate),
            255.0
        );
    }

    #[test]
    fn test_footer_height_ignores_body_blocks() {
        let blocks = vec![
            ContentBlock::text("body"),
            ContentBlock::Footer(TextBlock::new("line one\nline two")),
        ];
        let h = footer_height(&blocks, &geometry(), Measure::Exact);
        assert!((h - 2.0 * 36.0 * 1.2).abs() < 1e-3);
    }

    #[test]
    fn test_estimate_and_exact_agree_on_fixed_blocks() {
        let blank = ContentBlock::blank(300.0);
        assert_eq!(
            block_height(&blank, &geometry(), Measure::Estimate),
            block_height(&blank, &geometry(), Measure::Exact)
        );
    }
}
