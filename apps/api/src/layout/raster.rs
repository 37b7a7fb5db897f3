//! Page rasterizer: draws one planned page into an 8-bit grayscale bitmap.
//!
//! Rendering is a pure function of the page's blocks, the geometry and the embedded
//! fonts. Barcode and image failures never fail the page: they degrade to text (or to
//! nothing) inside the space the block already reserved.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::warn;

use crate::document::blocks::{
    Alignment, BarcodeBlock, ChoiceMode, ContentBlock, ImageBlock, ImageSource, OptionList, Page,
    TextBlock,
};
use crate::layout::barcode::{self, BarcodeError, BarcodeMatrix};
use crate::layout::font_metrics::{get_metrics, FontFace};
use crate::layout::fonts::FontSet;
use crate::layout::geometry::{RenderGeometry, LINE_HEIGHT_FACTOR};
use crate::layout::measure::{
    caption_style, marker_column_width, option_style, text_style, TextRole, TextStyle,
};
use crate::layout::placement::{plan_page, PagePlan, Placement};

const PAPER: Luma<u8> = Luma([255]);
const INK: Luma<u8> = Luma([0]);
const RULE: Luma<u8> = Luma([96]);

/// Smallest monospace size used when a barcode degrades to its payload text.
const MIN_PAYLOAD_FONT_PX: f32 = 8.0;

/// A block that could not be drawn as designed.
#[derive(Debug, Clone, PartialEq)]
pub enum Degraded {
    Barcode { index: usize, reason: String },
    Image { index: usize, reason: String },
}

pub struct RasterPage {
    pub bitmap: GrayImage,
    pub plan: PagePlan,
    /// Every non-empty line of text drawn, in drawing order.
    pub text_runs: Vec<String>,
    pub degraded: Vec<Degraded>,
}

pub fn rasterize(page: &Page, geometry: &RenderGeometry, fonts: &FontSet) -> RasterPage {
    let plan = plan_page(page, geometry);
    let mut canvas = Canvas {
        img: GrayImage::from_pixel(geometry.page_width, geometry.page_height, PAPER),
        fonts,
        geometry,
        text_runs: Vec::new(),
        degraded: Vec::new(),
    };

    for placement in plan.body.iter().chain(plan.footers.iter()) {
        let block = &page.content[placement.index];
        match block {
            ContentBlock::Text(t) => canvas.text(TextRole::Body, t, placement),
            ContentBlock::Header(t) => canvas.text(TextRole::Header, t, placement),
            ContentBlock::Footer(t) => {
                canvas.footer_rule(placement);
                canvas.text(TextRole::Footer, t, placement);
            }
            ContentBlock::OptionList(list) => canvas.options(list, placement),
            ContentBlock::Barcode(b) => canvas.barcode(b, placement),
            ContentBlock::Image(img) => canvas.image(img, placement),
            ContentBlock::BlankSpace(_) => canvas.reply_box(placement),
        }
    }

    if plan.overflows() {
        warn!(
            page = page.page_number,
            content_bottom = plan.content_bottom,
            footer_top = plan.footer_top,
            "Page body runs into the footer area"
        );
    }

    RasterPage {
        bitmap: canvas.img,
        plan,
        text_runs: canvas.text_runs,
        degraded: canvas.degraded,
    }
}

struct Canvas<'a> {
    img: GrayImage,
    fonts: &'a FontSet,
    geometry: &'a RenderGeometry,
    text_runs: Vec<String>,
    degraded: Vec<Degraded>,
}

impl Canvas<'_> {
    fn left(&self) -> f32 {
        self.geometry.margin_left
    }

    fn width(&self) -> f32 {
        self.geometry.content_width()
    }

    /// Wraps and draws `text` inside `[left, left + width)` starting at `top`.
    /// Returns the number of lines drawn.
    #[allow(clippy::too_many_arguments)]
    fn lines(
        &mut self,
        text: &str,
        style: &TextStyle,
        align: Alignment,
        left: f32,
        width: f32,
        top: f32,
        max_lines: Option<usize>,
    ) -> usize {
        let metrics = get_metrics(style.face);
        let wrapped = metrics.wrap(text, style.size, width);
        let limit = max_lines.unwrap_or(wrapped.len()).min(wrapped.len());
        let scale = self.fonts.scale(style.face, style.size);

        for (i, line) in wrapped.iter().take(limit).enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_width = metrics.measure_px(line, style.size);
            let x = match align {
                Alignment::Left => left,
                Alignment::Center => left + (width - line_width).max(0.0) / 2.0,
                Alignment::Right => left + (width - line_width).max(0.0),
            };
            let y = top + i as f32 * style.line_height;
            draw_text_mut(
                &mut self.img,
                INK,
                x.round() as i32,
                y.round() as i32,
                scale,
                self.fonts.font(style.face),
                line,
            );
            self.text_runs.push(line.clone());
        }
        limit
    }

    fn text(&mut self, role: TextRole, block: &TextBlock, placement: &Placement) {
        let style = text_style(role, block, self.geometry);
        self.lines(
            &block.text,
            &style,
            block.align,
            self.left(),
            self.width(),
            placement.top,
            None,
        );
    }

    fn footer_rule(&mut self, placement: &Placement) {
        let y = placement.top - 12.0;
        let (left, width) = (self.left(), self.width());
        draw_line_segment_mut(&mut self.img, (left, y), (left + width, y), RULE);
    }

    fn options(&mut self, list: &OptionList, placement: &Placement) {
        let style = option_style(list, self.geometry);
        let column = marker_column_width(&style);
        let text_left = self.left() + column;
        let text_width = (self.width() - column).max(style.size);
        let mut y = placement.top;

        for option in &list.options {
            self.marker(list.mode, self.left() + column / 2.0, y + style.line_height / 2.0, &style);
            let drawn = self.lines(
                &option.display_text(),
                &style,
                Alignment::Left,
                text_left,
                text_width,
                y,
                None,
            );
            y += drawn.max(1) as f32 * style.line_height;
        }
    }

    fn marker(&mut self, mode: ChoiceMode, cx: f32, cy: f32, style: &TextStyle) {
        let half = (style.size * 0.35).max(4.0);
        match mode {
            ChoiceMode::Circle => {
                let center = (cx.round() as i32, cy.round() as i32);
                let r = half.round() as i32;
                draw_hollow_circle_mut(&mut self.img, center, r, INK);
                draw_hollow_circle_mut(&mut self.img, center, r - 1, INK);
            }
            ChoiceMode::Checkbox => {
                let side = (half * 2.0).round() as u32;
                let x = (cx - half).round() as i32;
                let y = (cy - half).round() as i32;
                draw_hollow_rect_mut(&mut self.img, Rect::at(x, y).of_size(side, side), INK);
                draw_hollow_rect_mut(
                    &mut self.img,
                    Rect::at(x + 1, y + 1).of_size(side.saturating_sub(2).max(1), side.saturating_sub(2).max(1)),
                    INK,
                );
            }
        }
    }

    fn barcode(&mut self, block: &BarcodeBlock, placement: &Placement) {
        let size = placement.height.max(0.0);

        let drawn = barcode::encode(&block.payload, block.symbology).and_then(|symbol| {
            if symbol.is_linear() {
                self.bars(&symbol, placement.top, size)
            } else {
                self.modules(&symbol, placement.top, size)
            }
        });

        if let Err(e) = drawn {
            warn!(payload_len = block.payload.len(), error = %e, "Barcode generation failed, printing payload");
            self.degraded.push(Degraded::Barcode {
                index: placement.index,
                reason: e.to_string(),
            });
            self.payload_text(&block.payload, placement.top, size);
        }
    }

    /// 2D symbol centered in a `size` square.
    fn modules(&mut self, symbol: &BarcodeMatrix, top: f32, size: f32) -> Result<(), BarcodeError> {
        let module = symbol.module_px(size as u32)?;
        let quiet = symbol.quiet_zone();
        let span = (symbol.width() + 2 * quiet) as u32 * module;
        let box_left = self.left() + (self.width() - size).max(0.0) / 2.0;
        let origin_x = box_left.round() as i32 + ((size as u32 - span) / 2) as i32;
        let origin_y = top.round() as i32 + ((size as u32 - span) / 2) as i32;
        for my in 0..symbol.height() {
            for mx in 0..symbol.width() {
                if symbol.is_dark(mx, my) {
                    let x = origin_x + ((mx + quiet) as u32 * module) as i32;
                    let y = origin_y + ((my + quiet) as u32 * module) as i32;
                    draw_filled_rect_mut(&mut self.img, Rect::at(x, y).of_size(module, module), INK);
                }
            }
        }
        Ok(())
    }

    /// Linear symbol across the content width, bars as tall as the box.
    fn bars(&mut self, symbol: &BarcodeMatrix, top: f32, height: f32) -> Result<(), BarcodeError> {
        let box_width = self.width() as u32;
        let module = symbol.module_px(box_width)?;
        let quiet = symbol.quiet_zone();
        let span = (symbol.width() + 2 * quiet) as u32 * module;
        let origin_x = self.left().round() as i32 + ((box_width - span) / 2) as i32;
        let bar_height = (height.round() as u32).max(1);

        let mut x = 0;
        while x < symbol.width() {
            if !symbol.is_dark(x, 0) {
                x += 1;
                continue;
            }
            let start = x;
            while symbol.is_dark(x, 0) {
                x += 1;
            }
            let bar_left = origin_x + ((start + quiet) as u32 * module) as i32;
            draw_filled_rect_mut(
                &mut self.img,
                Rect::at(bar_left, top.round() as i32).of_size((x - start) as u32 * module, bar_height),
                INK,
            );
        }
        Ok(())
    }

    /// Prints a barcode payload in monospace inside the reserved box, shrinking the
    /// font until every line fits. Below `MIN_PAYLOAD_FONT_PX` the text is printed
    /// whole anyway.
    fn payload_text(&mut self, payload: &str, top: f32, height: f32) {
        let metrics = get_metrics(FontFace::Mono);
        let width = self.width();
        let mut size = self.geometry.default_font_size * 0.75;
        let mut count = metrics.wrap(payload, size, width).len();
        while count as f32 * size * LINE_HEIGHT_FACTOR > height && size > MIN_PAYLOAD_FONT_PX {
            size = (size * 0.9).max(MIN_PAYLOAD_FONT_PX);
            count = metrics.wrap(payload, size, width).len();
        }

        let style = TextStyle {
            face: FontFace::Mono,
            size,
            line_height: size * LINE_HEIGHT_FACTOR,
        };
        let needed = count as f32 * style.line_height;
        if needed > height {
            warn!(needed, height, "Barcode payload overflows its box");
        }
        let top = top + (height - needed).max(0.0) / 2.0;
        self.lines(payload, &style, Alignment::Center, self.left(), width, top, None);
    }

    fn image(&mut self, block: &ImageBlock, placement: &Placement) {
        let box_w = block.width.min(self.width()).max(0.0) as u32;
        let box_h = block.height.max(0.0) as u32;

        let drawn = match &block.source {
            ImageSource::Url { url } => Err(format!("remote image was not resolved: {url}")),
            ImageSource::Inline { data } if box_w == 0 || box_h == 0 => {
                Err(format!("empty target box for {} byte image", data.len()))
            }
            ImageSource::Inline { data } => image::load_from_memory(data)
                .map_err(|e| e.to_string())
                .map(|decoded| {
                    // `resize` keeps the aspect ratio and fits inside the box.
                    let fitted = decoded.resize(box_w, box_h, FilterType::Triangle).to_luma8();
                    let x = self.left() + (self.width() - fitted.width() as f32) / 2.0;
                    let y = placement.top + (box_h - fitted.height()) as f32 / 2.0;
                    imageops::overlay(&mut self.img, &fitted, x.round() as i64, y.round() as i64);
                }),
        };

        if let Err(reason) = drawn {
            warn!(reason = %reason, "Image block could not be drawn");
            self.degraded.push(Degraded::Image {
                index: placement.index,
                reason,
            });
            if let Some(fallback) = block.fallback_text.as_deref().filter(|t| !t.trim().is_empty()) {
                let style = caption_style(self.geometry);
                let max_lines = ((box_h as f32 / style.line_height).floor() as usize).max(1);
                self.lines(
                    fallback,
                    &style,
                    Alignment::Center,
                    self.left(),
                    self.width(),
                    placement.top,
                    Some(max_lines),
                );
            }
        }

        if let Some(caption) = block.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            let style = caption_style(self.geometry);
            self.lines(
                caption,
                &style,
                Alignment::Center,
                self.left(),
                self.width(),
                placement.top + box_h as f32,
                None,
            );
        }
    }

    fn reply_box(&mut self, placement: &Placement) {
        if placement.height < 8.0 {
            return;
        }
        let rect = Rect::at(self.left().round() as i32, placement.top.round() as i32)
            .of_size(self.width() as u32, placement.height as u32);
        draw_hollow_rect_mut(&mut self.img, rect, RULE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::blocks::{OptionItem, Symbology};
    use crate::document::reference::ReferenceId;
    use crate::layout::paginator::FooterTemplate;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn fonts() -> FontSet {
        FontSet::embedded().unwrap()
    }

    fn small_geometry() -> RenderGeometry {
        RenderGeometry {
            page_width: 800,
            page_height: 1000,
            dpi: 100,
            margin_top: 40.0,
            margin_bottom: 40.0,
            margin_left: 40.0,
            margin_right: 40.0,
            default_font_size: 24.0,
        }
    }

    fn page(body: Vec<ContentBlock>) -> Page {
        let reference = ReferenceId::new(2025, 1234).unwrap();
        let mut content = body;
        content.push(FooterTemplate::new("support@example").block(&reference, 1, 1));
        Page {
            content,
            page_number: 1,
            total_pages: 1,
        }
    }

    fn ink_rows(img: &GrayImage, top: u32, bottom: u32) -> usize {
        (top..bottom.min(img.height()))
            .filter(|&y| (0..img.width()).any(|x| img.get_pixel(x, y)[0] < 128))
            .count()
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, image::Rgb([0, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_bitmap_matches_geometry() {
        let raster = rasterize(&page(vec![ContentBlock::text("hello")]), &small_geometry(), &fonts());
        assert_eq!(raster.bitmap.dimensions(), (800, 1000));
        assert!(raster.text_runs.contains(&"hello".to_string()));
    }

    #[test]
    fn test_footer_text_drawn_at_bottom() {
        let geometry = small_geometry();
        let raster = rasterize(&page(vec![]), &geometry, &fonts());
        assert!(raster.text_runs.iter().any(|r| r.contains("FX-2025-001234")));
        let footer_top = raster.plan.footer_top as u32;
        assert!(ink_rows(&raster.bitmap, footer_top, geometry.page_height) > 0);
        assert_eq!(ink_rows(&raster.bitmap, 0, footer_top - 20), 0);
    }

    #[test]
    fn test_barcode_failure_prints_payload_in_reserved_box() {
        let geometry = small_geometry();
        let mut code = BarcodeBlock::qr("ORDÉR-42");
        code.symbology = Symbology::Code128;
        code.size = 200.0;
        let raster = rasterize(
            &page(vec![ContentBlock::Barcode(code), ContentBlock::text("next")]),
            &geometry,
            &fonts(),
        );

        assert!(matches!(raster.degraded[0], Degraded::Barcode { index: 0, .. }));
        assert!(raster.text_runs.contains(&"ORDÉR-42".to_string()));
        let (barcode, next) = (raster.plan.body[0], raster.plan.body[1]);
        assert_eq!(barcode.height, 200.0);
        assert_eq!(next.top, barcode.top + 200.0);
    }

    #[test]
    fn test_long_barcode_payload_is_printed_whole() {
        let geometry = small_geometry();
        let payload = format!("{}END", "SKU-998877665544-".repeat(5));
        let mut code = BarcodeBlock::qr(payload.clone());
        code.symbology = Symbology::Code128;
        code.size = 40.0;
        let raster = rasterize(
            &page(vec![ContentBlock::Barcode(code), ContentBlock::text("next")]),
            &geometry,
            &fonts(),
        );

        // Too many modules for the content width, so the payload is printed instead.
        assert!(matches!(raster.degraded[0], Degraded::Barcode { index: 0, .. }));
        let printed: String = raster
            .text_runs
            .iter()
            .take_while(|run| run.as_str() != "next")
            .cloned()
            .collect();
        assert_eq!(printed, payload);
        let (barcode, next) = (raster.plan.body[0], raster.plan.body[1]);
        assert_eq!(next.top, barcode.top + 40.0);
    }

    #[test]
    fn test_code128_draws_full_height_bars() {
        let geometry = small_geometry();
        let mut code = BarcodeBlock::qr("ORDER-42");
        code.symbology = Symbology::Code128;
        code.size = 120.0;
        let raster = rasterize(&page(vec![ContentBlock::Barcode(code)]), &geometry, &fonts());

        assert!(raster.degraded.is_empty());
        assert!(!raster.text_runs.iter().any(|r| r.contains("ORDER-42")));
        let top = raster.plan.body[0].top as u32;
        assert_eq!(ink_rows(&raster.bitmap, top, top + 120), 120);
        // 143 modules at 5px leave 5px of slack: the start bar begins at 40 + 2 + 50.
        assert_eq!(raster.bitmap.get_pixel(92, top + 60)[0], 0);
        assert_eq!(raster.bitmap.get_pixel(91, top + 60)[0], 255);
    }

    #[test]
    fn test_qr_draws_modules() {
        let geometry = small_geometry();
        let raster = rasterize(
            &page(vec![ContentBlock::Barcode(BarcodeBlock::qr("FX-2025-001234"))]),
            &geometry,
            &fonts(),
        );
        assert!(raster.degraded.is_empty());
        let top = raster.plan.body[0].top as u32;
        assert!(ink_rows(&raster.bitmap, top, top + 320) > 100);
    }

    #[test]
    fn test_unresolved_image_uses_fallback_text() {
        let block = ImageBlock {
            source: ImageSource::Url {
                url: "https://cdn.example/map.png".into(),
            },
            width: 300.0,
            height: 200.0,
            caption: None,
            fallback_text: Some("Map unavailable".into()),
            margin_top: 0.0,
            margin_bottom: 0.0,
        };
        let raster = rasterize(&page(vec![ContentBlock::Image(block)]), &small_geometry(), &fonts());
        assert!(matches!(raster.degraded[0], Degraded::Image { .. }));
        assert!(raster.text_runs.contains(&"Map unavailable".to_string()));
    }

    #[test]
    fn test_corrupt_image_without_fallback_is_skipped() {
        let block = ImageBlock {
            source: ImageSource::Inline {
                data: b"not an image".to_vec(),
            },
            width: 300.0,
            height: 200.0,
            caption: None,
            fallback_text: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
        };
        let raster = rasterize(&page(vec![ContentBlock::Image(block)]), &small_geometry(), &fonts());
        assert_eq!(raster.degraded.len(), 1);
        let top = raster.plan.body[0].top as u32;
        assert_eq!(ink_rows(&raster.bitmap, top, top + 200), 0);
    }

    #[test]
    fn test_wide_image_keeps_aspect_ratio() {
        let geometry = small_geometry();
        let block = ImageBlock {
            source: ImageSource::Inline {
                data: png_bytes(400, 100),
            },
            width: 400.0,
            height: 400.0,
            caption: Some("Store front".into()),
            fallback_text: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
        };
        let raster = rasterize(&page(vec![ContentBlock::Image(block)]), &geometry, &fonts());
        assert!(raster.degraded.is_empty());
        let top = raster.plan.body[0].top as u32;
        let inked = ink_rows(&raster.bitmap, top, top + 400);
        assert!((95..=105).contains(&inked), "image rows {inked}");
        assert!(raster.text_runs.contains(&"Store front".to_string()));
    }

    #[test]
    fn test_option_markers_drawn_per_option() {
        let list = OptionList::new(
            ChoiceMode::Checkbox,
            vec![OptionItem::new("A", "Bread"), OptionItem::new("B", "Eggs")],
        );
        let raster = rasterize(&page(vec![ContentBlock::OptionList(list)]), &small_geometry(), &fonts());
        assert!(raster.text_runs.contains(&"A. Bread".to_string()));
        assert!(raster.text_runs.contains(&"B. Eggs".to_string()));
        let marker_x = 40 + (24.0 * 1.5 / 2.0) as u32;
        let top = raster.plan.body[0].top as u32;
        let inked = (top..top + 60).any(|y| raster.bitmap.get_pixel(marker_x, y)[0] < 128);
        assert!(inked, "expected a marker in the marker column");
    }
}
