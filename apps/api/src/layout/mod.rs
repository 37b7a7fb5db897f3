// Page layout: metrics, pagination, vertical placement and rasterization.
// Everything here is synchronous and CPU-bound; async callers go through
// `render::Renderer`, which runs it inside tokio::task::spawn_blocking.

pub mod barcode;
pub mod font_metrics;
pub mod fonts;
pub mod geometry;
pub mod measure;
pub mod paginator;
pub mod placement;
pub mod raster;

pub use fonts::FontSet;
pub use geometry::RenderGeometry;
pub use paginator::{paginate, FooterTemplate};
pub use raster::{rasterize, Degraded, RasterPage};
