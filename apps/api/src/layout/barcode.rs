//! Barcode generation. Produces a module matrix; drawing happens in `layout::raster`.
//!
//! QR codes come from the `qrcode` crate. Code 128 is encoded here using code set B,
//! which covers printable ASCII; a linear symbol is a matrix one module tall.

use qrcode::{Color, QrCode};
use thiserror::Error;

use crate::document::blocks::Symbology;

/// Light modules kept around a QR symbol on each side.
pub const QUIET_ZONE: usize = 4;

/// Light modules kept left and right of a Code 128 symbol.
pub const LINEAR_QUIET_ZONE: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum BarcodeError {
    #[error("payload cannot be encoded: {0}")]
    Encode(String),

    #[error("{modules} modules do not fit in a {size}px box")]
    TooDense { modules: usize, size: u32 },
}

/// Grid of dark/light modules, row-major, quiet zone excluded.
#[derive(Debug, Clone)]
pub struct BarcodeMatrix {
    width: usize,
    height: usize,
    quiet_zone: usize,
    dark: Vec<bool>,
}

impl BarcodeMatrix {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn quiet_zone(&self) -> usize {
        self.quiet_zone
    }

    /// Linear symbols are drawn as bars stretched over the box height.
    pub fn is_linear(&self) -> bool {
        self.height == 1
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        if x >= self.width {
            return false;
        }
        self.dark.get(y * self.width + x).copied().unwrap_or(false)
    }

    /// Integer module size that fits the symbol plus quiet zone into `box_px`.
    pub fn module_px(&self, box_px: u32) -> Result<u32, BarcodeError> {
        let modules = self.width + 2 * self.quiet_zone;
        let px = box_px / modules as u32;
        if px == 0 {
            return Err(BarcodeError::TooDense {
                modules,
                size: box_px,
            });
        }
        Ok(px)
    }
}

pub fn encode(payload: &str, symbology: Symbology) -> Result<BarcodeMatrix, BarcodeError> {
    match symbology {
        Symbology::Qr => {
            let code =
                QrCode::new(payload.as_bytes()).map_err(|e| BarcodeError::Encode(e.to_string()))?;
            let width = code.width();
            Ok(BarcodeMatrix {
                width,
                height: width,
                quiet_zone: QUIET_ZONE,
                dark: code.to_colors().into_iter().map(|c| c == Color::Dark).collect(),
            })
        }
        Symbology::Code128 => code128(payload),
    }
}

/// Bar/space widths of every Code 128 symbol value, bar first. 103..=105 are the
/// start codes; `STOP` ends every symbol.
const CODE128_PATTERNS: [&[u8; 6]; 106] = [
    b"212222", b"222122", b"222221", b"121223", b"121322", b"131222", b"122213", b"122312",
    b"132212", b"221213", b"221312", b"231212", b"112232", b"122132", b"122231", b"113222",
    b"123122", b"123221", b"223211", b"221132", b"221231", b"213212", b"223112", b"312131",
    b"311222", b"321122", b"321221", b"312212", b"322112", b"322211", b"212123", b"212321",
    b"232121", b"111323", b"131123", b"131321", b"112313", b"132113", b"132311", b"211313",
    b"231113", b"231311", b"112133", b"112331", b"132131", b"113123", b"113321", b"133121",
    b"313121", b"211331", b"231131", b"213113", b"213311", b"213131", b"311123", b"311321",
    b"331121", b"312113", b"312311", b"332111", b"314111", b"221411", b"431111", b"111224",
    b"111422", b"121124", b"121421", b"141122", b"141221", b"112214", b"112412", b"122114",
    b"122411", b"142112", b"142211", b"241211", b"221114", b"413111", b"241112", b"134111",
    b"111242", b"121142", b"121241", b"114212", b"124112", b"124211", b"411212", b"421112",
    b"421211", b"212141", b"214121", b"412121", b"111143", b"111341", b"131141", b"114113",
    b"114311", b"411113", b"411311", b"113141", b"114131", b"311141", b"411131", b"211412",
    b"211214", b"211232",
];

const STOP: &[u8; 7] = b"2331112";
const START_B: usize = 104;

/// Symbol values for a code set B payload: start, data, mod-103 check digit.
fn code128_values(payload: &str) -> Result<Vec<usize>, BarcodeError> {
    if payload.is_empty() {
        return Err(BarcodeError::Encode("empty payload".into()));
    }

    let mut values = Vec::with_capacity(payload.len() + 2);
    values.push(START_B);
    for ch in payload.chars() {
        match ch {
            ' '..='~' => values.push(ch as usize - ' ' as usize),
            other => {
                return Err(BarcodeError::Encode(format!(
                    "code128 cannot encode {other:?}"
                )))
            }
        }
    }

    let weighted: usize = values
        .iter()
        .enumerate()
        .map(|(i, v)| v * i.max(1))
        .sum();
    values.push(weighted % 103);
    Ok(values)
}

fn code128(payload: &str) -> Result<BarcodeMatrix, BarcodeError> {
    let values = code128_values(payload)?;

    let mut dark = Vec::with_capacity(values.len() * 11 + STOP.len() * 2);
    let widths = values
        .iter()
        .flat_map(|&v| CODE128_PATTERNS[v].iter())
        .chain(STOP.iter());
    // Patterns alternate bar, space; every pattern has an even count so bars stay on
    // even positions across symbols.
    for (i, w) in widths.enumerate() {
        let is_bar = i % 2 == 0;
        dark.extend(std::iter::repeat(is_bar).take((w - b'0') as usize));
    }

    Ok(BarcodeMatrix {
        width: dark.len(),
        height: 1,
        quiet_zone: LINEAR_QUIET_ZONE,
        dark,
    })
}
