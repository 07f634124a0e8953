//! The resume document exchanged with the editor front end.
//!
//! Section values are kept as raw JSON: the layout engine only needs to know
//! whether a value is an array, an object, or a scalar, and the editors own
//! the inner shape of each entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Section holding name/contact details. Rendered as the page-0 header, never
/// placed into a column.
pub const HEADER_SECTION: &str = "personalInfo";

/// Top-level keys with fixed meaning; everything else is a section.
pub const RESERVED_KEYS: &[&str] = &["template", "layout", "visibleSections", "design"];

pub fn is_section_key(key: &str) -> bool {
    !key.trim().is_empty() && !RESERVED_KEYS.contains(&key)
}

/// Visual template. Each template maps to one layout algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    /// Two-column primary template.
    #[default]
    Modern,
    /// Single-column ATS-compatible template.
    Ats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Left,
    Right,
}

/// Which sections go in which column, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl ColumnLayout {
    pub fn keys(&self, column: Column) -> &[String] {
        match column {
            Column::Left => &self.left,
            Column::Right => &self.right,
        }
    }
}

/// Design settings. Drive both the visual style and the page geometry.
///
/// `font_size` is in CSS pixels, `margin` in millimetres, `spacing` is a
/// multiplier on the vertical space between blocks inside an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesignConfig {
    pub font: String,
    pub font_size: f32,
    pub line_height: f32,
    pub margin: f32,
    pub spacing: f32,
    pub title_color: String,
    pub subtitle_color: String,
}

impl DesignConfig {
    /// Rejects settings that would make page geometry meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err("fontSize must be positive".to_string());
        }
        if !(self.line_height.is_finite() && self.line_height > 0.0) {
            return Err("lineHeight must be positive".to_string());
        }
        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err("margin must not be negative".to_string());
        }
        if !(self.spacing.is_finite() && self.spacing >= 0.0) {
            return Err("spacing must not be negative".to_string());
        }
        Ok(())
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        DesignConfig {
            font: "Inter".to_string(),
            font_size: 14.0,
            line_height: 1.4,
            margin: 12.0,
            spacing: 1.0,
            title_color: "#1f2937".to_string(),
            subtitle_color: "#4b5563".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDocument {
    #[serde(default)]
    pub template: Template,
    #[serde(default)]
    pub layout: ColumnLayout,
    #[serde(default)]
    pub visible_sections: BTreeMap<String, bool>,
    #[serde(default)]
    pub design: DesignConfig,
    /// Every other top-level key is a section.
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl ResumeDocument {
    /// A section is shown unless it has been explicitly hidden.
    pub fn is_visible(&self, key: &str) -> bool {
        self.visible_sections.get(key).copied().unwrap_or(true)
    }

    pub fn section(&self, key: &str) -> Option<&Value> {
        self.sections.get(key)
    }

    pub fn header(&self) -> Option<&Value> {
        self.sections
            .get(HEADER_SECTION)
            .filter(|v| !v.is_null() && self.is_visible(HEADER_SECTION))
    }

    /// Replaces a section's whole value, as emitted by a section editor.
    pub fn set_section(&mut self, key: &str, value: Value) {
        self.sections.insert(key.to_string(), value);
    }

    pub fn set_visibility(&mut self, key: &str, visible: bool) {
        self.visible_sections.insert(key.to_string(), visible);
    }
}
