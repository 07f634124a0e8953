//! Measurement Buffer — produces a pixel height for every entry before packing.
//!
//! Each entry (plus the header and one generic section title) is turned into
//! a `RenderSpec` describing the blocks it would render, then handed to a
//! `Measurer`. The default measurer simulates line wrapping with static font
//! metrics; anything able to report rendered heights (a headless browser, a
//! real shaping engine) can be plugged in instead.
//!
//! Some sections over-measure systematically when measured in isolation
//! (skill chips share flex rows on the real page, slider bars settle smaller
//! than their intermediate layout). Their heights are scaled by per-section
//! `CorrectionFactors`. These are calibration values, not derived ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::layout::entries::{column_entries, ordered_entries, Entry};
use crate::layout::font_metrics::{metrics_for, FontFamily, FontMetrics};
use crate::layout::geometry::PageGeometry;
use crate::layout::renderer::{RenderOptions, RendererRegistry};
use crate::models::{Column, DesignConfig, ResumeDocument, Template};

// ────────────────────────────────────────────────────────────────────────────
// Render specs
// ────────────────────────────────────────────────────────────────────────────

/// One visual block of a measured element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Block {
    /// Wrapped paragraph. `scale` is relative to the design font size.
    Text { text: String, scale: f32, bold: bool },
    /// Flex-wrapped pill labels.
    Chips { labels: Vec<String> },
    /// One label line plus a level bar per row.
    Sliders { labels: Vec<String> },
    /// Fixed-size graphic (charts, cover grids, icon rows), in em.
    Visual { height_em: f32 },
}

/// What the off-screen clone of one element would render, at a given width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSpec {
    pub id: String,
    pub width: f32,
    pub blocks: Vec<Block>,
}

/// Reports the rendered height of a spec, in pixels.
pub trait Measurer: Send + Sync {
    fn measure(&self, spec: &RenderSpec, design: &DesignConfig) -> f32;
}

const HEADING_KEYS: &[&str] = &["title", "name", "position", "degree", "role"];
const META_KEYS: &[&str] = &[
    "company",
    "institution",
    "school",
    "location",
    "date",
    "startDate",
    "endDate",
    "period",
];
const SKIPPED_KEYS: &[&str] = &["id", "icon", "color", "url", "image", "level", "value"];

fn is_skipped(key: &str) -> bool {
    SKIPPED_KEYS.contains(&key) || key.ends_with("Id")
}

fn text(text: impl Into<String>, scale: f32, bold: bool) -> Block {
    Block::Text {
        text: text.into(),
        scale,
        bold,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Label of a chip/slider/legend item: the item itself if it is a string,
/// otherwise its first heading-like field.
fn item_label(item: &Value) -> Option<String> {
    match item {
        Value::Object(fields) => ["name", "label", "title"]
            .iter()
            .find_map(|k| fields.get(*k).and_then(scalar_text)),
        other => scalar_text(other),
    }
}

fn items_of(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Generic flattening used by ordinary text sections (experience, education,
/// projects, ...): headings first, then a meta line, then body text.
fn flatten_blocks(value: &Value, out: &mut Vec<Block>) {
    match value {
        Value::Object(fields) => {
            let mut headings = Vec::new();
            let mut meta = Vec::new();
            let mut body = Vec::new();
            for (key, field) in fields {
                if is_skipped(key) {
                    continue;
                }
                if HEADING_KEYS.contains(&key.as_str()) {
                    if let Some(s) = scalar_text(field) {
                        headings.push(text(s, 1.05, true));
                        continue;
                    }
                }
                if META_KEYS.contains(&key.as_str()) {
                    if let Some(s) = scalar_text(field) {
                        meta.push(s);
                        continue;
                    }
                }
                flatten_blocks(field, &mut body);
            }
            out.extend(headings);
            if !meta.is_empty() {
                out.push(text(meta.join(" · "), 0.85, false));
            }
            out.extend(body);
        }
        Value::Array(items) => {
            for item in items {
                match scalar_text(item) {
                    Some(s) => out.push(text(format!("• {s}"), 1.0, false)),
                    None => flatten_blocks(item, out),
                }
            }
        }
        Value::Bool(_) | Value::Null => {}
        other => {
            if let Some(s) = scalar_text(other) {
                out.push(text(s, 1.0, false));
            }
        }
    }
}

/// Blocks for one entry, by section type.
pub fn entry_blocks(section_key: &str, data: &Value) -> Vec<Block> {
    match section_key {
        "skills" | "languages" | "interests" => match data {
            Value::Object(fields) if fields.contains_key("items") => {
                let mut blocks = Vec::new();
                if let Some(group) = item_label(data) {
                    blocks.push(text(group, 1.0, true));
                }
                let labels = items_of(&fields["items"])
                    .into_iter()
                    .filter_map(item_label)
                    .collect();
                blocks.push(Block::Chips { labels });
                blocks
            }
            other => vec![Block::Chips {
                labels: items_of(other).into_iter().filter_map(item_label).collect(),
            }],
        },
        "industrialExpertise" => vec![Block::Sliders {
            labels: items_of(data).into_iter().filter_map(item_label).collect(),
        }],
        "myTime" => {
            let mut blocks = vec![Block::Visual { height_em: 9.0 }];
            blocks.extend(
                items_of(data)
                    .into_iter()
                    .filter_map(item_label)
                    .map(|l| text(l, 0.85, false)),
            );
            blocks
        }
        "books" => {
            let rows = items_of(data).len().div_ceil(4);
            vec![Block::Visual {
                height_em: rows as f32 * 7.5,
            }]
        }
        "hobbies" => {
            let items = items_of(data);
            let rows = items.len().div_ceil(3);
            vec![Block::Visual {
                height_em: rows as f32 * 4.0,
            }]
        }
        "summary" => match scalar_text(data) {
            Some(s) => vec![text(s, 1.0, false)],
            None => {
                let mut blocks = Vec::new();
                flatten_blocks(data, &mut blocks);
                blocks
            }
        },
        _ => {
            let mut blocks = Vec::new();
            flatten_blocks(data, &mut blocks);
            blocks
        }
    }
}

pub fn entry_spec(entry: &Entry, width: f32) -> RenderSpec {
    RenderSpec {
        id: entry.id.clone(),
        width,
        blocks: entry_blocks(&entry.section_key, &entry.data),
    }
}

/// The header: name, headline, then contact details on one wrapped line.
pub fn header_spec(header: &Value, width: f32) -> RenderSpec {
    let mut blocks = Vec::new();
    if let Value::Object(fields) = header {
        if let Some(name) = fields.get("name").and_then(scalar_text) {
            blocks.push(text(name, 1.9, true));
        }
        if let Some(headline) = ["title", "headline", "jobTitle"]
            .iter()
            .find_map(|k| fields.get(*k).and_then(scalar_text))
        {
            blocks.push(text(headline, 1.2, false));
        }
        let contact: Vec<String> = fields
            .iter()
            .filter(|(k, _)| !["name", "title", "headline", "jobTitle", "photo"].contains(&k.as_str()))
            .filter_map(|(_, v)| scalar_text(v))
            .collect();
        if !contact.is_empty() {
            blocks.push(text(contact.join("  ·  "), 0.9, false));
        }
    } else if let Some(s) = scalar_text(header) {
        blocks.push(text(s, 1.9, true));
    }
    RenderSpec {
        id: "header".to_string(),
        width,
        blocks,
    }
}

/// Synthetic section title used to estimate every section's heading height.
pub fn title_spec(width: f32) -> RenderSpec {
    RenderSpec {
        id: "title".to_string(),
        width,
        blocks: vec![
            text("Section Title", 1.25, true),
            Block::Visual { height_em: 0.2 },
        ],
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Text-metrics measurer
// ────────────────────────────────────────────────────────────────────────────

const CHIP_SCALE: f32 = 0.9;
const CHIP_PADDING_EM: f32 = 0.6;
const CHIP_GAP_EM: f32 = 0.4;
const SLIDER_BAR_EM: f32 = 0.5;
/// Vertical gap between blocks of one entry, before the design spacing multiplier.
const BLOCK_GAP_EM: f32 = 0.3;

/// Measures specs by simulating greedy line wrapping with static font metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMetricsMeasurer;

impl TextMetricsMeasurer {
    fn block_height(&self, block: &Block, width: f32, font_px: f32, line: f32, m: &FontMetrics) -> f32 {
        match block {
            Block::Text { text, scale, bold } => {
                let size = font_px * scale;
                let lines = m.wrap_lines(text, width / size, *bold);
                lines as f32 * size * line
            }
            Block::Chips { labels } => {
                if labels.is_empty() {
                    return 0.0;
                }
                let size = font_px * CHIP_SCALE;
                let gap = CHIP_GAP_EM * font_px;
                let mut rows = 1usize;
                let mut row_width = 0.0_f32;
                for label in labels {
                    let chip = (m.measure_str(label) * size + 2.0 * CHIP_PADDING_EM * font_px).min(width);
                    if row_width > 0.0 && row_width + gap + chip > width {
                        rows += 1;
                        row_width = chip;
                    } else if row_width > 0.0 {
                        row_width += gap + chip;
                    } else {
                        row_width = chip;
                    }
                }
                let chip_height = size * line + CHIP_PADDING_EM * font_px;
                rows as f32 * chip_height + (rows - 1) as f32 * gap
            }
            Block::Sliders { labels } => {
                let row = font_px * line + SLIDER_BAR_EM * font_px + BLOCK_GAP_EM * font_px;
                labels.len() as f32 * row
            }
            Block::Visual { height_em } => height_em * font_px,
        }
    }
}

impl Measurer for TextMetricsMeasurer {
    fn measure(&self, spec: &RenderSpec, design: &DesignConfig) -> f32 {
        let metrics = metrics_for(FontFamily::from_name(&design.font));
        let font_px = design.font_size.max(1.0);
        let line = design.line_height.max(0.5);
        let block_gap = BLOCK_GAP_EM * font_px * design.spacing.max(0.0);

        let heights: Vec<f32> = spec
            .blocks
            .iter()
            .map(|b| self.block_height(b, spec.width, font_px, line, &metrics))
            .filter(|h| *h > 0.0)
            .collect();

        if heights.is_empty() {
            return 0.0;
        }
        heights.iter().sum::<f32>() + (heights.len() - 1) as f32 * block_gap
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Correction factors
// ────────────────────────────────────────────────────────────────────────────

/// Per-section multipliers applied to raw measured heights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionFactors(BTreeMap<String, f32>);

impl CorrectionFactors {
    /// Calibrated defaults observed for each template.
    pub fn defaults_for(template: Template) -> Self {
        let pairs: &[(&str, f32)] = match template {
            Template::Modern => &[("industrialExpertise", 0.6), ("skills", 0.9)],
            Template::Ats => &[("summary", 0.8)],
        };
        CorrectionFactors(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    /// Parses `section=factor` pairs separated by commas.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut factors = BTreeMap::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected section=factor, got '{pair}'"))?;
            let factor: f32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid factor '{}' for '{}'", value.trim(), key.trim()))?;
            if !(factor.is_finite() && factor > 0.0) {
                return Err(format!("factor for '{}' must be positive", key.trim()));
            }
            factors.insert(key.trim().to_string(), factor);
        }
        Ok(CorrectionFactors(factors))
    }

    /// Overrides win over the receiver's values.
    pub fn merged(mut self, overrides: &CorrectionFactors) -> Self {
        for (k, v) in &overrides.0 {
            self.0.insert(k.clone(), *v);
        }
        self
    }

    pub fn factor(&self, section_key: &str) -> f32 {
        self.0.get(section_key).copied().unwrap_or(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Measured heights
// ────────────────────────────────────────────────────────────────────────────

/// `entry id → pixel height`. Filled once per pass, read-only during packing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MeasuredHeights(BTreeMap<String, f32>);

impl MeasuredHeights {
    pub fn insert(&mut self, id: impl Into<String>, height: f32) {
        self.0.insert(id.into(), height.max(0.0));
    }

    /// Unknown ids measure 0: the entry is placed as if it took no space.
    pub fn get(&self, id: &str) -> f32 {
        match self.0.get(id) {
            Some(h) => *h,
            None => {
                debug!(id, "no measured height, treating as 0");
                0.0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f32)> for MeasuredHeights {
    fn from_iter<T: IntoIterator<Item = (K, f32)>>(iter: T) -> Self {
        let mut heights = MeasuredHeights::default();
        for (id, h) in iter {
            heights.insert(id, h);
        }
        heights
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub header_height: f32,
    pub title_height: f32,
    pub heights: MeasuredHeights,
}

// ────────────────────────────────────────────────────────────────────────────
// Buffer
// ────────────────────────────────────────────────────────────────────────────

pub struct MeasurementBuffer<'a> {
    measurer: &'a dyn Measurer,
    design: &'a DesignConfig,
    corrections: &'a CorrectionFactors,
    renderers: Option<&'a RendererRegistry>,
}

impl<'a> MeasurementBuffer<'a> {
    pub fn new(
        measurer: &'a dyn Measurer,
        design: &'a DesignConfig,
        corrections: &'a CorrectionFactors,
    ) -> Self {
        MeasurementBuffer {
            measurer,
            design,
            corrections,
            renderers: None,
        }
    }

    /// Measures what the section renderers emit in measuring mode rather
    /// than the raw entry data.
    pub fn with_renderers(mut self, registry: &'a RendererRegistry) -> Self {
        self.renderers = Some(registry);
        self
    }

    fn spec_for(&self, document: &ResumeDocument, entry: &Entry, width: f32) -> RenderSpec {
        let (Some(registry), Some(section)) = (self.renderers, document.section(&entry.section_key))
        else {
            return entry_spec(entry, width);
        };
        let index = [entry.index];
        let options = RenderOptions {
            items_to_render: (!entry.is_unbreakable && !entry.is_single).then_some(&index[..]),
            design: self.design,
            is_measuring: true,
        };
        let blocks = registry
            .renderer_for(&entry.section_key, section)
            .render(section, &options)
            .iter()
            .flat_map(|fragment| entry_blocks(&entry.section_key, &fragment.data))
            .collect();
        RenderSpec {
            id: entry.id.clone(),
            width,
            blocks,
        }
    }

    fn measure_into(
        &self,
        document: &ResumeDocument,
        entries: &[Entry],
        width: f32,
        heights: &mut MeasuredHeights,
    ) {
        for entry in entries {
            let raw = self.measurer.measure(&self.spec_for(document, entry, width), self.design);
            heights.insert(entry.id.clone(), raw * self.corrections.factor(&entry.section_key));
        }
    }

    /// Measures the header, the generic title, and every visible entry at the
    /// width it will occupy under the document's template.
    pub fn measure(&self, document: &ResumeDocument, geometry: &PageGeometry) -> Measurements {
        let content_width = geometry.content_width();
        let header_height = document
            .header()
            .map(|h| self.measurer.measure(&header_spec(h, content_width), self.design))
            .unwrap_or(0.0);

        let mut heights = MeasuredHeights::default();
        let title_width = match document.template {
            Template::Modern => {
                let left = geometry.column_width(Column::Left);
                let right = geometry.column_width(Column::Right);
                self.measure_into(document, &column_entries(document, Column::Left), left, &mut heights);
                self.measure_into(document, &column_entries(document, Column::Right), right, &mut heights);
                // The narrower column gives the taller (safer) title estimate.
                right.min(left)
            }
            Template::Ats => {
                self.measure_into(document, &ordered_entries(document), content_width, &mut heights);
                content_width
            }
        };
        let title_height = self.measurer.measure(&title_spec(title_width), self.design);

        debug!(
            entries = heights.len(),
            header_height, title_height, "measurement pass complete"
        );

        Measurements {
            header_height,
            title_height,
            heights,
        }
    }
}
