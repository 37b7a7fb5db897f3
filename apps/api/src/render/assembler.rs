//! Multi-page PDF assembly. Each rasterized page becomes one full-bleed grayscale
//! image XObject, so the fax gateway receives exactly the pixels we laid out.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GrayImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use thiserror::Error;

use crate::layout::geometry::RenderGeometry;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no pages to assemble")]
    Empty,

    #[error("page {page} is {actual:?}, expected {expected:?}")]
    PageSize {
        page: usize,
        actual: (u32, u32),
        expected: (u32, u32),
    },

    #[error("compression failed: {0}")]
    Compress(std::io::Error),

    #[error("content stream encoding failed: {0}")]
    Content(String),

    #[error("pdf serialization failed: {0}")]
    Save(std::io::Error),
}

/// Bundles page bitmaps, in order, into one PDF sized from the geometry's DPI.
pub fn assemble_pdf(
    pages: &[GrayImage],
    geometry: &RenderGeometry,
    title: &str,
) -> Result<Vec<u8>, AssembleError> {
    if pages.is_empty() {
        return Err(AssembleError::Empty);
    }
    let expected = (geometry.page_width, geometry.page_height);
    let (width_pt, height_pt) = geometry.page_size_points();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());

    for (idx, bitmap) in pages.iter().enumerate() {
        if bitmap.dimensions() != expected {
            return Err(AssembleError::PageSize {
                page: idx + 1,
                actual: bitmap.dimensions(),
                expected,
            });
        }

        let image_id = doc.add_object(gray_xobject(bitmap)?);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| AssembleError::Content(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
        "Producer" => Object::String(b"faxback".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(AssembleError::Save)?;
    Ok(buffer)
}

fn gray_xobject(bitmap: &GrayImage) -> Result<Stream, AssembleError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bitmap.as_raw())
        .map_err(AssembleError::Compress)?;
    let data = encoder.finish().map_err(AssembleError::Compress)?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => bitmap.width() as i64,
        "Height" => bitmap.height() as i64,
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    // Already deflated; stop lopdf from compressing again.
    Ok(Stream::new(dict, data).with_compression(false))
}
