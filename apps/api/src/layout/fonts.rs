use ab_glyph::{Font, FontRef, InvalidFont, PxScale};

use crate::layout::font_metrics::FontFace;

static SANS: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static SANS_BOLD: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");
static MONO: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

/// The embedded faces, parsed once at startup and shared read-only by render workers.
pub struct FontSet {
    sans: FontRef<'static>,
    sans_bold: FontRef<'static>,
    mono: FontRef<'static>,
}

impl FontSet {
    pub fn embedded() -> Result<Self, InvalidFont> {
        Ok(Self {
            sans: FontRef::try_from_slice(SANS)?,
            sans_bold: FontRef::try_from_slice(SANS_BOLD)?,
            mono: FontRef::try_from_slice(MONO)?,
        })
    }

    pub fn font(&self, face: FontFace) -> &FontRef<'static> {
        match face {
            FontFace::Sans => &self.sans,
            FontFace::SansBold => &self.sans_bold,
            FontFace::Mono => &self.mono,
        }
    }

    /// Scale at which one em equals `size_px`, so drawn advances match the metric tables.
    ///
    /// `PxScale` is expressed as ascent-to-descent height, hence the conversion.
    pub fn scale(&self, face: FontFace, size_px: f32) -> PxScale {
        let font = self.font(face);
        let units_per_em = font.units_per_em().unwrap_or(2048.0);
        PxScale::from(size_px * font.height_unscaled() / units_per_em)
    }
}
