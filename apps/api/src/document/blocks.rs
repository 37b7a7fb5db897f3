//! Content model: a renderer-agnostic description of one outbound document.
//!
//! `ContentBlock` is a closed sum type: every variant carries only the fields its
//! renderer needs. The serde representation (`{"type": "option_list", ...}`) is the
//! wire format agents use for `documentSpec.blocks`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::document::reference::ReferenceId;

// ────────────────────────────────────────────────────────────────────────────
// Text
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Payload shared by `text`, `header` and `footer` blocks.
///
/// `font_size` is in pixels; `None` means "use the geometry default" (headers and
/// footers scale that default, see `layout::measure`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub text: String,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub weight: Option<FontWeight>,
    #[serde(default)]
    pub align: Alignment,
    #[serde(default)]
    pub margin_top: f32,
    #[serde(default)]
    pub margin_bottom: f32,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: None,
            weight: None,
            align: Alignment::Left,
            margin_top: 0.0,
            margin_bottom: 0.0,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = Some(FontWeight::Bold);
        self
    }

    pub fn centered(mut self) -> Self {
        self.align = Alignment::Center;
        self
    }

    pub fn size(mut self, px: f32) -> Self {
        self.font_size = Some(px);
        self
    }

    pub fn margins(mut self, top: f32, bottom: f32) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Option lists
// ────────────────────────────────────────────────────────────────────────────

/// How the reader marks a choice on paper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceMode {
    /// Exactly one option, drawn with an open circle.
    #[default]
    #[serde(alias = "exclusive")]
    Circle,
    /// Any number of options, drawn with an open square.
    #[serde(alias = "non_exclusive")]
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionItem {
    /// Single letter the reader can circle or quote back ("A", "B", ...).
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub price: Option<f64>,
}

impl OptionItem {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            price: None,
        }
    }

    /// The single run of text drawn to the right of the marker.
    pub fn display_text(&self) -> String {
        match self.price {
            Some(price) => format!("{}. {} - ${:.2}", self.label, self.description, price),
            None => format!("{}. {}", self.label, self.description),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionList {
    #[serde(default)]
    pub mode: ChoiceMode,
    pub options: Vec<OptionItem>,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub margin_top: f32,
    #[serde(default)]
    pub margin_bottom: f32,
}

impl OptionList {
    pub fn new(mode: ChoiceMode, options: Vec<OptionItem>) -> Self {
        Self {
            mode,
            options,
            font_size: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Barcodes, images, spacers
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    #[default]
    Qr,
    Code128,
}

pub const DEFAULT_BARCODE_SIZE: f32 = 320.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeBlock {
    pub payload: String,
    #[serde(default)]
    pub symbology: Symbology,
    /// Height of the box reserved for the code, in pixels. QR codes get a square box;
    /// linear codes span the content width.
    #[serde(default = "default_barcode_size")]
    pub size: f32,
    #[serde(default)]
    pub margin_top: f32,
    #[serde(default)]
    pub margin_bottom: f32,
}

fn default_barcode_size() -> f32 {
    DEFAULT_BARCODE_SIZE
}

impl BarcodeBlock {
    pub fn qr(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            symbology: Symbology::Qr,
            size: DEFAULT_BARCODE_SIZE,
            margin_top: 0.0,
            margin_bottom: 0.0,
        }
    }
}

/// Where image bytes come from. Remote sources are resolved before rasterization;
/// an unresolved `Url` at render time is treated as a failed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Inline {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Url {
        url: String,
    },
}

pub const DEFAULT_IMAGE_WIDTH: f32 = 600.0;
pub const DEFAULT_IMAGE_HEIGHT: f32 = 400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
    pub source: ImageSource,
    #[serde(default = "default_image_width")]
    pub width: f32,
    #[serde(default = "default_image_height")]
    pub height: f32,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub fallback_text: Option<String>,
    #[serde(default)]
    pub margin_top: f32,
    #[serde(default)]
    pub margin_bottom: f32,
}

fn default_image_width() -> f32 {
    DEFAULT_IMAGE_WIDTH
}

fn default_image_height() -> f32 {
    DEFAULT_IMAGE_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlankSpace {
    pub height: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Content block sum type
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Header(TextBlock),
    Footer(TextBlock),
    OptionList(OptionList),
    Barcode(BarcodeBlock),
    Image(ImageBlock),
    BlankSpace(BlankSpace),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock::new(text))
    }

    pub fn header(text: impl Into<String>) -> Self {
        ContentBlock::Header(TextBlock::new(text))
    }

    pub fn blank(height: f32) -> Self {
        ContentBlock::BlankSpace(BlankSpace { height })
    }

    pub fn is_footer(&self) -> bool {
        matches!(self, ContentBlock::Footer(_))
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ContentBlock::Text(_) => "text",
            ContentBlock::Header(_) => "header",
            ContentBlock::Footer(_) => "footer",
            ContentBlock::OptionList(_) => "option_list",
            ContentBlock::Barcode(_) => "barcode",
            ContentBlock::Image(_) => "image",
            ContentBlock::BlankSpace(_) => "blank_space",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pages and documents
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Response,
    Clarification,
    Welcome,
    Help,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Response => "response",
            DocumentKind::Clarification => "clarification",
            DocumentKind::Welcome => "welcome",
            DocumentKind::Help => "help",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub content: Vec<ContentBlock>,
    /// 1-based.
    pub page_number: u32,
    /// Back-filled once pagination has seen every block.
    pub total_pages: u32,
}

impl Page {
    pub fn footers(&self) -> impl Iterator<Item = &TextBlock> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::Footer(t) => Some(t),
            _ => None,
        })
    }

    pub fn body(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content.iter().filter(|b| !b.is_footer())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("document has no pages")]
    NoPages,

    #[error("page {page} is numbered out of sequence (expected {expected})")]
    PageSequence { page: u32, expected: u32 },

    #[error("page {page} has {found} footer blocks, expected exactly one")]
    FooterCount { page: u32, found: usize },

    #[error("page {page} footer does not carry reference {reference}")]
    FooterReference { page: u32, reference: String },

    #[error("invalid {block} block: {reason}")]
    InvalidBlock { block: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub kind: DocumentKind,
    pub reference_id: ReferenceId,
    pub pages: Vec<Page>,
    pub context_data: Value,
}

impl Document {
    /// Builds a document, enforcing the page-numbering and footer invariants.
    pub fn new(
        kind: DocumentKind,
        reference_id: ReferenceId,
        pages: Vec<Page>,
        context_data: Value,
    ) -> Result<Self, DocumentError> {
        if pages.is_empty() {
            return Err(DocumentError::NoPages);
        }
        let total = pages.len() as u32;
        for (idx, page) in pages.iter().enumerate() {
            let expected = idx as u32 + 1;
            if page.page_number != expected || page.total_pages != total {
                return Err(DocumentError::PageSequence {
                    page: page.page_number,
                    expected,
                });
            }
            let footers: Vec<&TextBlock> = page.footers().collect();
            if footers.len() != 1 {
                return Err(DocumentError::FooterCount {
                    page: page.page_number,
                    found: footers.len(),
                });
            }
            if !footers[0].text.contains(reference_id.as_str()) {
                return Err(DocumentError::FooterReference {
                    page: page.page_number,
                    reference: reference_id.to_string(),
                });
            }
        }
        Ok(Self {
            kind,
            reference_id,
            pages,
            context_data,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// serde adapter: inline image bytes travel as standard base64 strings.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference() -> ReferenceId {
        ReferenceId::new(2025, 1234).unwrap()
    }

    fn footer_page(n: u32, total: u32, text: &str) -> Page {
        Page {
            content: vec![
                ContentBlock::text("body"),
                ContentBlock::Footer(TextBlock::new(text)),
            ],
            page_number: n,
            total_pages: total,
        }
    }

    #[test]
    fn test_agent_block_json_deserializes_into_variants() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "header", "text": "Your order"},
            {"type": "option_list", "mode": "checkbox", "options": [
                {"label": "A", "description": "Milk", "price": 2.5}
            ]},
            {"type": "barcode", "payload": "ORDER-1"},
            {"type": "image", "source": {"kind": "url", "url": "https://x/y.png"},
             "fallbackText": "map unavailable"},
            {"type": "blank_space", "height": 200}
        ]))
        .unwrap();

        assert_eq!(blocks.len(), 5);
        assert!(matches!(&blocks[1], ContentBlock::OptionList(l) if l.mode == ChoiceMode::Checkbox));
        match &blocks[2] {
            ContentBlock::Barcode(b) => {
                assert_eq!(b.symbology, Symbology::Qr);
                assert_eq!(b.size, DEFAULT_BARCODE_SIZE);
            }
            other => panic!("expected barcode, got {other:?}"),
        }
        match &blocks[3] {
            ContentBlock::Image(i) => {
                assert_eq!(i.width, DEFAULT_IMAGE_WIDTH);
                assert_eq!(i.fallback_text.as_deref(), Some("map unavailable"));
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_image_bytes_are_base64_on_the_wire() {
        let block = ContentBlock::Image(ImageBlock {
            source: ImageSource::Inline {
                data: vec![0x89, 0x50, 0x4e, 0x47],
            },
            width: 10.0,
            height: 10.0,
            caption: None,
            fallback_text: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
        });
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["source"]["data"], "iVBORw==");
        let back: ContentBlock = serde_json::from_value(value).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_exclusive_alias_maps_to_circle() {
        let list: OptionList =
            serde_json::from_value(json!({"mode": "exclusive", "options": []})).unwrap();
        assert_eq!(list.mode, ChoiceMode::Circle);
    }

    #[test]
    fn test_option_display_text_with_price() {
        let mut item = OptionItem::new("B", "Oat milk, 1L");
        assert_eq!(item.display_text(), "B. Oat milk, 1L");
        item.price = Some(3.5);
        assert_eq!(item.display_text(), "B. Oat milk, 1L - $3.50");
    }

    #[test]
    fn test_document_requires_pages() {
        let err = Document::new(DocumentKind::Response, reference(), vec![], json!({}));
        assert_eq!(err.unwrap_err(), DocumentError::NoPages);
    }

    #[test]
    fn test_document_rejects_gap_in_numbering() {
        let pages = vec![
            footer_page(1, 2, "Ref FX-2025-001234"),
            footer_page(3, 2, "Ref FX-2025-001234"),
        ];
        let err = Document::new(DocumentKind::Response, reference(), pages, json!({}));
        assert!(matches!(err, Err(DocumentError::PageSequence { page: 3, .. })));
    }

    #[test]
    fn test_document_rejects_footer_without_reference() {
        let pages = vec![footer_page(1, 1, "Support line only")];
        let err = Document::new(DocumentKind::Response, reference(), pages, json!({}));
        assert!(matches!(err, Err(DocumentError::FooterReference { .. })));
    }

    #[test]
    fn test_document_accepts_well_formed_pages() {
        let pages = vec![
            footer_page(1, 2, "Ref FX-2025-001234 Page 1 of 2"),
            footer_page(2, 2, "Ref FX-2025-001234 Page 2 of 2"),
        ];
        let doc = Document::new(DocumentKind::Response, reference(), pages, json!({})).unwrap();
        assert_eq!(doc.page_count(), 2);
    }
}
