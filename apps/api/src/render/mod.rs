// Render: validated draft → paginated Document → page bitmaps → PDF bytes.
// Rasterization is CPU-bound and runs on the blocking pool, at most `workers` at once.

pub mod assembler;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::document::blocks::{Document, DocumentError};
use crate::document::builder::{validate_blocks, DocumentDraft};
use crate::document::reference::ReferenceId;
use crate::layout::{paginate, rasterize, Degraded, FontSet, FooterTemplate, RenderGeometry};
use crate::media::{resolve_images, ImageFetcher};

pub use assembler::{assemble_pdf, AssembleError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid document: {0}")]
    Document(#[from] DocumentError),

    #[error("assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error("render worker failed: {0}")]
    Worker(String),
}

pub struct RenderedDocument {
    pub document: Document,
    pub pdf: Vec<u8>,
    /// Blocks drawn as fallbacks, per page (1-based page number, detail).
    pub degraded: Vec<(u32, Degraded)>,
}

/// Shared, immutable render configuration plus the bounded worker pool.
pub struct Renderer {
    geometry: Arc<RenderGeometry>,
    fonts: Arc<FontSet>,
    footer: FooterTemplate,
    images: Arc<dyn ImageFetcher>,
    permits: Arc<Semaphore>,
}

impl Renderer {
    pub fn new(
        geometry: RenderGeometry,
        fonts: FontSet,
        footer: FooterTemplate,
        images: Arc<dyn ImageFetcher>,
        workers: usize,
    ) -> Self {
        Self {
            geometry: Arc::new(geometry),
            fonts: Arc::new(fonts),
            footer,
            images,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn geometry(&self) -> &RenderGeometry {
        &self.geometry
    }

    pub async fn render(
        &self,
        draft: DocumentDraft,
        reference: ReferenceId,
    ) -> Result<RenderedDocument, RenderError> {
        let DocumentDraft {
            kind,
            mut blocks,
            context_data,
        } = draft;
        validate_blocks(&blocks)?;

        // Network I/O happens here, before the pure part starts.
        resolve_images(&mut blocks, self.images.as_ref()).await;

        let pages = paginate(&blocks, &self.footer, &reference, &self.geometry);
        let document = Document::new(kind, reference, pages, context_data)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RenderError::Worker(e.to_string()))?;

        let geometry = Arc::clone(&self.geometry);
        let fonts = Arc::clone(&self.fonts);
        let started = std::time::Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let mut bitmaps = Vec::with_capacity(document.pages.len());
            let mut degraded = Vec::new();
            for page in &document.pages {
                let raster = rasterize(page, &geometry, &fonts);
                degraded.extend(raster.degraded.into_iter().map(|d| (page.page_number, d)));
                bitmaps.push(raster.bitmap);
            }
            let pdf = assemble_pdf(&bitmaps, &geometry, document.reference_id.as_str())?;
            Ok::<_, RenderError>(RenderedDocument {
                document,
                pdf,
                degraded,
            })
        })
        .await
        .map_err(|e| RenderError::Worker(e.to_string()))?;

        match &result {
            Ok(rendered) => info!(
                reference_id = %rendered.document.reference_id,
                kind = rendered.document.kind.as_str(),
                pages = rendered.document.page_count(),
                bytes = rendered.pdf.len(),
                degraded = rendered.degraded.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Rendered document"
            ),
            Err(e) => error!("Rendering failed: {e}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::blocks::{
        ChoiceMode, ContentBlock, DocumentKind, ImageBlock, ImageSource, OptionItem, OptionList,
    };
    use crate::testing::StaticImageFetcher;
    use serde_json::json;

    fn renderer(images: StaticImageFetcher) -> Renderer {
        Renderer::new(
            RenderGeometry::default(),
            FontSet::embedded().unwrap(),
            FooterTemplate::new("help@faxback.example"),
            Arc::new(images),
            2,
        )
    }

    fn long_text() -> String {
        "Your groceries will arrive tomorrow between nine and noon. ".repeat(52)
    }

    #[tokio::test]
    async fn test_render_produces_multi_page_pdf() {
        let reference = ReferenceId::parse("FX-2025-001234").unwrap();
        let draft = DocumentDraft {
            kind: DocumentKind::Response,
            blocks: vec![
                ContentBlock::text(long_text()),
                ContentBlock::OptionList(OptionList::new(
                    ChoiceMode::Circle,
                    ["A", "B", "C", "D", "E"]
                        .iter()
                        .map(|l| OptionItem::new(*l, format!("Choice {l}")))
                        .collect(),
                )),
            ],
            context_data: json!({}),
        };

        let rendered = renderer(StaticImageFetcher::default())
            .render(draft, reference)
            .await
            .unwrap();
        assert!(rendered.document.page_count() >= 2);
        let pdf = lopdf::Document::load_mem(&rendered.pdf).unwrap();
        assert_eq!(pdf.get_pages().len(), rendered.document.page_count());
    }

    #[tokio::test]
    async fn test_failed_remote_image_degrades_not_fails() {
        let reference = ReferenceId::new(2025, 5).unwrap();
        let draft = DocumentDraft {
            kind: DocumentKind::Response,
            blocks: vec![ContentBlock::Image(ImageBlock {
                source: ImageSource::Url {
                    url: "https://cdn.example/missing.png".into(),
                },
                width: 400.0,
                height: 300.0,
                caption: None,
                fallback_text: Some("Picture unavailable".into()),
                margin_top: 0.0,
                margin_bottom: 0.0,
            })],
            context_data: json!({}),
        };

        let rendered = renderer(StaticImageFetcher::default())
            .render(draft, reference)
            .await
            .unwrap();
        assert_eq!(rendered.degraded.len(), 1);
        assert!(matches!(rendered.degraded[0], (1, Degraded::Image { .. })));
    }

    #[tokio::test]
    async fn test_invalid_draft_is_render_error() {
        let draft = DocumentDraft {
            kind: DocumentKind::Response,
            blocks: vec![ContentBlock::text("   ")],
            context_data: json!({}),
        };
        let err = renderer(StaticImageFetcher::default())
            .render(draft, ReferenceId::new(2025, 6).unwrap())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::Document(DocumentError::InvalidBlock { .. })));
    }
}
