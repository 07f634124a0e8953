//! Physical page geometry, in CSS pixels.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Column, DesignConfig};

/// CSS reference pixel density: 96 px per inch.
pub const PX_PER_MM: f32 = 96.0 / 25.4;

/// Vertical gap between two entries stacked in the same column.
pub const ITEM_GAP_PX: f32 = 10.0;

/// Slack kept free at the bottom of every page so rounding in the real
/// renderer never pushes the last entry over the edge.
pub const SAFETY_MARGIN_PX: f32 = 20.0;

/// Horizontal gap between the two columns of the modern template.
pub const COLUMN_GAP_PX: f32 = 24.0;

/// Share of the content width (after the column gap) given to the left column.
pub const LEFT_COLUMN_SHARE: f32 = 0.62;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
}

impl PageFormat {
    /// (width, height) in millimetres.
    pub fn size_mm(self) -> (f32, f32) {
        match self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::Letter => (215.9, 279.4),
        }
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageFormat::A4),
            "letter" | "us-letter" => Ok(PageFormat::Letter),
            other => Err(format!("unknown page format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub format: PageFormat,
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub fn new(format: PageFormat, design: &DesignConfig) -> Self {
        let (w, h) = format.size_mm();
        PageGeometry {
            format,
            page_width: w * PX_PER_MM,
            page_height: h * PX_PER_MM,
            margin: design.margin.max(0.0) * PX_PER_MM,
        }
    }

    pub fn content_width(&self) -> f32 {
        (self.page_width - 2.0 * self.margin).max(0.0)
    }

    /// Width of one column of the two-column template.
    pub fn column_width(&self, column: Column) -> f32 {
        let shared = (self.content_width() - COLUMN_GAP_PX).max(0.0);
        match column {
            Column::Left => shared * LEFT_COLUMN_SHARE,
            Column::Right => shared * (1.0 - LEFT_COLUMN_SHARE),
        }
    }

    /// Height budget for page content. The header only occupies page 0.
    pub fn available_height(&self, first_page: bool, header_height: f32) -> f32 {
        let header = if first_page { header_height } else { 0.0 };
        (self.page_height - 2.0 * self.margin - header - SAFETY_MARGIN_PX).max(0.0)
    }
}
