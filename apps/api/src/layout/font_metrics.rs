//! Static font metrics for the resume font families offered by the editor.
//!
//! Widths come from two base faces (a grotesque sans and a transitional serif)
//! in per-mille of the em, scaled per family. This approximates what the
//! browser would lay out closely enough for page packing; the per-section
//! correction factors in `measure` absorb the remaining systematic error.
//! Tables cover ASCII 0x20..=0x7E; index = (char as usize) - 32.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Font families
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Inter,
    Roboto,
    Lato,
    OpenSans,
    Merriweather,
    Georgia,
    SourceSerif,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseFace {
    Sans,
    Serif,
}

impl FontFamily {
    /// Resolves a design font name ("Open Sans", "open-sans", "Georgia").
    /// Unknown names fall back to Inter, the editor's default.
    pub fn from_name(name: &str) -> FontFamily {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "roboto" => FontFamily::Roboto,
            "lato" => FontFamily::Lato,
            "opensans" => FontFamily::OpenSans,
            "merriweather" => FontFamily::Merriweather,
            "georgia" => FontFamily::Georgia,
            "sourceserif" | "sourceserifpro" | "sourceserif4" => FontFamily::SourceSerif,
            _ => FontFamily::Inter,
        }
    }

    fn base_face(self) -> BaseFace {
        match self {
            FontFamily::Inter | FontFamily::Roboto | FontFamily::Lato | FontFamily::OpenSans => {
                BaseFace::Sans
            }
            FontFamily::Merriweather | FontFamily::Georgia | FontFamily::SourceSerif => {
                BaseFace::Serif
            }
        }
    }

    /// Width of this family relative to its base face.
    fn width_scale(self) -> f32 {
        match self {
            FontFamily::Inter => 1.03,
            FontFamily::Roboto => 0.98,
            FontFamily::Lato => 0.96,
            FontFamily::OpenSans => 1.04,
            FontFamily::Merriweather => 1.12,
            FontFamily::Georgia => 1.06,
            FontFamily::SourceSerif => 1.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Metrics
// ────────────────────────────────────────────────────────────────────────────

/// Extra width applied to bold runs (headings, job titles).
const BOLD_WIDTH_FACTOR: f32 = 1.07;

#[derive(Debug, Clone, Copy)]
pub struct FontMetrics {
    pub family: FontFamily,
    widths: &'static [u16; 95],
    fallback: u16,
    scale: f32,
}

pub fn metrics_for(family: FontFamily) -> FontMetrics {
    let (widths, fallback) = match family.base_face() {
        BaseFace::Sans => (&SANS_WIDTHS, SANS_FALLBACK),
        BaseFace::Serif => (&SERIF_WIDTHS, SERIF_FALLBACK),
    };
    FontMetrics {
        family,
        widths,
        fallback,
        scale: family.width_scale(),
    }
}

impl FontMetrics {
    /// Width of `s` in em units. Characters outside printable ASCII use the
    /// face's average lowercase width.
    pub fn measure_str(&self, s: &str) -> f32 {
        let per_mille: u32 = s
            .chars()
            .map(|c| {
                let code = c as usize;
                if (32..=126).contains(&code) {
                    self.widths[code - 32] as u32
                } else {
                    self.fallback as u32
                }
            })
            .sum();
        per_mille as f32 / 1000.0 * self.scale
    }

    pub fn measure_bold(&self, s: &str) -> f32 {
        self.measure_str(s) * BOLD_WIDTH_FACTOR
    }

    /// Number of lines `text` occupies when greedily word-wrapped at
    /// `max_width_em`. Explicit newlines start a new paragraph; blank
    /// paragraphs still take one line. A word wider than the line gets a
    /// line of its own.
    pub fn wrap_lines(&self, text: &str, max_width_em: f32, bold: bool) -> usize {
        if text.trim().is_empty() {
            return 0;
        }
        let width = |s: &str| {
            if bold {
                self.measure_bold(s)
            } else {
                self.measure_str(s)
            }
        };
        let space = width(" ");

        text.lines()
            .map(|paragraph| {
                let mut lines = 1usize;
                let mut current = 0.0_f32;
                let mut first = true;
                for word in paragraph.split_whitespace() {
                    let w = width(word);
                    if first {
                        current = w;
                        first = false;
                    } else if current + space + w > max_width_em {
                        lines += 1;
                        current = w;
                    } else {
                        current += space + w;
                    }
                }
                lines
            })
            .sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Base width tables (per-mille of the em)
// ────────────────────────────────────────────────────────────────────────────

const SANS_FALLBACK: u16 = 540;
const SERIF_FALLBACK: u16 = 470;

#[rustfmt::skip]
static SANS_WIDTHS: [u16; 95] = [
    // sp   !    "    #    $    %    &    '    (    )    *    +    ,    -    .    /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // :    ;    <    =    >    ?    @
    278, 278, 584, 584, 584, 556, 1015,
    // A-M
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    // N-Z
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [    \    ]    ^    _    `
    278, 278, 278, 469, 556, 333,
    // a-m
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    // n-z
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    // {    |    }    ~
    334, 260, 334, 584,
];

#[rustfmt::skip]
static SERIF_WIDTHS: [u16; 95] = [
    // sp   !    "    #    $    %    &    '    (    )    *    +    ,    -    .    /
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    // 0-9
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    // :    ;    <    =    >    ?    @
    278, 278, 564, 564, 564, 444, 921,
    // A-M
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
    // N-Z
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    // [    \    ]    ^    _    `
    333, 278, 333, 469, 500, 333,
    // a-m
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
    // n-z
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    // {    |    }    ~
    480, 200, 480, 541,
];
