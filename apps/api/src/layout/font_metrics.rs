//! Static font-metric tables for the three embedded DejaVu faces.
//!
//! Character advances are in em units (relative to font size), taken from the
//! `hmtx` tables of the bundled font files so that wrapping decisions made here match
//! the glyphs `layout::raster` actually draws. Tables cover ASCII 0x20..=0x7E;
//! index = (char as usize) - 32. Anything else falls back to `average_char_width`.
//!
//! Two measuring modes exist on purpose:
//! - `wrap` uses per-glyph widths (exact; the rasterizer).
//! - `estimated_lines` uses `average_char_width` for every character (the paginator's
//!   cheap look-ahead). The averages are taken over letters only, so the estimate runs
//!   slightly wide and errs toward an extra line rather than an overflowing page.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Font faces
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFace {
    /// Body text, option rows, footers.
    Sans,
    /// Headers and any block with `weight: bold`.
    SansBold,
    /// Barcode payload fallback.
    Mono,
}

// ────────────────────────────────────────────────────────────────────────────
// Font metric table
// ────────────────────────────────────────────────────────────────────────────

/// Static character-width table for a font face.
///
/// Width array slot layout:
/// ```text
/// [0]=sp  [1]=!   [2]="   [3]=#   [4]=$   [5]=%   [6]=&   [7]='
/// [8]=(   [9]=)   [10]=*  [11]=+  [12]=,  [13]=-  [14]=.  [15]=/
/// [16..25]=0-9
/// [26]=:  [27]=;  [28]=<  [29]==  [30]=>  [31]=?  [32]=@
/// [33..58]=A-Z
/// [59]=[  [60]=\  [61]=]  [62]=^  [63]=_  [64]=`
/// [65..90]=a-z
/// [91]={  [92]=|  [93]=}  [94]=~
/// ```
pub struct FontMetricTable {
    pub face: FontFace,
    widths: [f32; 95],
    /// Mean advance over A-Z and a-z; used for estimates and non-ASCII fallback.
    pub average_char_width: f32,
    pub space_width: f32,
}

impl FontMetricTable {
    /// Measures a string in em units.
    pub fn measure_str(&self, s: &str) -> f32 {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    /// Measures a string in pixels at `size_px` per em.
    pub fn measure_px(&self, s: &str, size_px: f32) -> f32 {
        self.measure_str(s) * size_px
    }

    fn char_width(&self, c: char) -> f32 {
        let code = c as usize;
        if (32..=126).contains(&code) {
            self.widths[code - 32]
        } else {
            self.average_char_width
        }
    }

    /// Greedy word-wrap using exact glyph advances. Explicit newlines start new
    /// paragraphs; an empty paragraph yields one empty line.
    pub fn wrap(&self, text: &str, size_px: f32, max_width_px: f32) -> Vec<String> {
        greedy_wrap(text, max_width_px, |s| self.measure_px(s, size_px))
    }

    /// Line count a text would wrap to, approximated with the average char width.
    pub fn estimated_lines(&self, text: &str, size_px: f32, max_width_px: f32) -> usize {
        let avg = self.average_char_width * size_px;
        greedy_wrap(text, max_width_px, |s| s.chars().count() as f32 * avg).len()
    }
}

/// Appends the next word if it fits, else starts a new line. A single word wider
/// than the line is hard-broken at character boundaries.
fn greedy_wrap<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut produced = false;

        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if measure(&candidate) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                produced = true;
            }

            if measure(word) <= max_width {
                current = word.to_string();
            } else {
                // Hard-break an overlong token; every chunk holds at least one char.
                for ch in word.chars() {
                    let mut next = current.clone();
                    next.push(ch);
                    if !current.is_empty() && measure(&next) > max_width {
                        lines.push(std::mem::take(&mut current));
                        produced = true;
                        current.push(ch);
                    } else {
                        current = next;
                    }
                }
            }
        }

        if !current.is_empty() || !produced {
            lines.push(current);
        }
    }

    lines
}

// ────────────────────────────────────────────────────────────────────────────
// Static width tables  (95 ASCII printable characters each)
// ────────────────────────────────────────────────────────────────────────────

/// DejaVu Sans Book.
static SANS_TABLE: FontMetricTable = FontMetricTable {
    face: FontFace::Sans,
    #[rustfmt::skip]
    widths: [
        // sp     !      "      #      $      %      &      '      (      )      *      +      ,      -      .      /
        0.318, 0.401, 0.460, 0.838, 0.636, 0.950, 0.780, 0.275, 0.390, 0.390, 0.500, 0.838, 0.318, 0.361, 0.318, 0.337,
        // 0      1      2      3      4      5      6      7      8      9
        0.636, 0.636, 0.636, 0.636, 0.636, 0.636, 0.636, 0.636, 0.636, 0.636,
        // :      ;      <      =      >      ?      @
        0.337, 0.337, 0.838, 0.838, 0.838, 0.531, 1.000,
        // A      B      C      D      E      F      G      H      I      J      K      L      M
        0.684, 0.686, 0.698, 0.770, 0.632, 0.575, 0.775, 0.752, 0.295, 0.295, 0.656, 0.557, 0.863,
        // N      O      P      Q      R      S      T      U      V      W      X      Y      Z
        0.748, 0.787, 0.603, 0.787, 0.695, 0.635, 0.611, 0.732, 0.684, 0.989, 0.685, 0.611, 0.685,
        // [      \      ]      ^      _      `
        0.390, 0.337, 0.390, 0.838, 0.500, 0.500,
        // a      b      c      d      e      f      g      h      i      j      k      l      m
        0.613, 0.635, 0.550, 0.635, 0.615, 0.352, 0.635, 0.634, 0.278, 0.278, 0.579, 0.278, 0.974,
        // n      o      p      q      r      s      t      u      v      w      x      y      z
        0.634, 0.612, 0.635, 0.635, 0.411, 0.521, 0.392, 0.634, 0.592, 0.818, 0.592, 0.592, 0.525,
        // {      |      }      ~
        0.636, 0.337, 0.636, 0.838,
    ],
    average_char_width: 0.618,
    space_width: 0.318,
};

/// DejaVu Sans Bold.
static SANS_BOLD_TABLE: FontMetricTable = FontMetricTable {
    face: FontFace::SansBold,
    #[rustfmt::skip]
    widths: [
        // sp     !      "      #      $      %      &      '      (      )      *      +      ,      -      .      /
        0.348, 0.456, 0.521, 0.838, 0.696, 1.002, 0.872, 0.306, 0.457, 0.457, 0.523, 0.838, 0.380, 0.415, 0.380, 0.365,
        // 0      1      2      3      4      5      6      7      8      9
        0.696, 0.696, 0.696, 0.696, 0.696, 0.696, 0.696, 0.696, 0.696, 0.696,
        // :      ;      <      =      >      ?      @
        0.400, 0.400, 0.838, 0.838, 0.838, 0.580, 1.000,
        // A      B      C      D      E      F      G      H      I      J      K      L      M
        0.774, 0.762, 0.734, 0.830, 0.683, 0.683, 0.821, 0.837, 0.372, 0.372, 0.775, 0.637, 0.995,
        // N      O      P      Q      R      S      T      U      V      W      X      Y      Z
        0.837, 0.850, 0.733, 0.850, 0.770, 0.720, 0.682, 0.812, 0.774, 1.103, 0.771, 0.724, 0.725,
        // [      \      ]      ^      _      `
        0.457, 0.365, 0.457, 0.838, 0.500, 0.500,
        // a      b      c      d      e      f      g      h      i      j      k      l      m
        0.675, 0.716, 0.593, 0.716, 0.678, 0.435, 0.716, 0.712, 0.343, 0.343, 0.665, 0.343, 1.042,
        // n      o      p      q      r      s      t      u      v      w      x      y      z
        0.712, 0.687, 0.716, 0.716, 0.493, 0.595, 0.478, 0.712, 0.652, 0.924, 0.645, 0.652, 0.582,
        // {      |      }      ~
        0.712, 0.365, 0.712, 0.838,
    ],
    average_char_width: 0.696,
    space_width: 0.348,
};

/// DejaVu Sans Mono: every advance is 0.602em.
static MONO_TABLE: FontMetricTable = FontMetricTable {
    face: FontFace::Mono,
    widths: [0.602; 95],
    average_char_width: 0.602,
    space_width: 0.602,
};

pub fn get_metrics(face: FontFace) -> &'static FontMetricTable {
    match face {
        FontFace::Sans => &SANS_TABLE,
        FontFace::SansBold => &SANS_BOLD_TABLE,
        FontFace::Mono => &MONO_TABLE,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
