//! Debug Visualizer — draws a computed layout as an SVG diagram.
//!
//! Pages are laid out side by side at `scale`. Each page shows its margins,
//! the header box (page 0), a dashed line at the bottom of its height budget,
//! and one box per placed entry stacked the way packing billed them.
//! Pages where the starvation guard fired are outlined in red.

use crate::layout::engine::Layout;
use crate::layout::entries::slot_entry_id;
use crate::layout::geometry::COLUMN_GAP_PX;
use crate::layout::packing::{PagePlan, SectionSlots};
use crate::models::{Column, ResumeDocument};

pub const DEFAULT_SCALE: f32 = 0.5;

/// Space between pages and around the drawing, in output units.
const PAGE_SPACING: f32 = 24.0;
const PAGE_STROKE: &str = "#9ca3af";
const OVERFLOW_STROKE: &str = "#dc2626";
const BUDGET_STROKE: &str = "#2563eb";
const ENTRY_FILL: &str = "#e5e7eb";
const TITLE_FILL: &str = "#fde68a";
const HEADER_FILL: &str = "#c7d2fe";

/// One column of one page: its slots and horizontal extent in page pixels.
struct ColumnFrame<'a> {
    index: usize,
    x: f32,
    width: f32,
    slots: &'a SectionSlots,
}

struct PageFrame {
    index: usize,
    origin_x: f32,
    origin_y: f32,
    available_height: f32,
    overflowed: bool,
}

struct Canvas<'a> {
    document: &'a ResumeDocument,
    layout: &'a Layout,
    scale: f32,
    out: String,
}

impl Canvas<'_> {
    fn rect(&mut self, page: &PageFrame, x: f32, y: f32, w: f32, h: f32, style: &str) {
        self.out.push_str(&format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" {style}/>"#,
            page.origin_x + x * self.scale,
            page.origin_y + y * self.scale,
            w * self.scale,
            h * self.scale,
        ));
    }

    fn label(&mut self, page: &PageFrame, x: f32, y: f32, text: &str) {
        self.out.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}">{}</text>"#,
            page.origin_x + x * self.scale + 2.0,
            page.origin_y + y * self.scale + 10.0,
            escape_xml(text),
        ));
    }

    fn is_titled(&self, page: usize, column: usize, key: &str) -> bool {
        self.layout
            .pages
            .get(page)
            .and_then(|p| p.columns.get(column))
            .and_then(|c| c.sections.iter().find(|s| s.key == key))
            .is_some_and(|s| s.title.is_some())
    }

    fn draw_page(&mut self, page: &PageFrame, columns: &[ColumnFrame<'_>]) {
        let g = self.layout.geometry;
        let stroke = if page.overflowed { OVERFLOW_STROKE } else { PAGE_STROKE };
        let width = if page.overflowed { 2 } else { 1 };
        self.rect(
            page,
            0.0,
            0.0,
            g.page_width,
            g.page_height,
            &format!(r#"fill="white" stroke="{stroke}" stroke-width="{width}""#),
        );
        self.label(page, g.margin, 0.0, &format!("page {}", page.index + 1));

        let mut top = g.margin;
        if page.index == 0 && self.layout.measurements.header_height > 0.0 {
            let h = self.layout.measurements.header_height;
            self.rect(page, g.margin, top, g.content_width(), h, &format!(r#"fill="{HEADER_FILL}""#));
            self.label(page, g.margin, top, &format!("header h={h:.0}"));
            top += h;
        }

        let budget_y = page.origin_y + (top + page.available_height) * self.scale;
        self.out.push_str(&format!(
            r#"<line x1="{:.1}" y1="{budget_y:.1}" x2="{:.1}" y2="{budget_y:.1}" stroke="{BUDGET_STROKE}" stroke-dasharray="4 3"/>"#,
            page.origin_x,
            page.origin_x + g.page_width * self.scale,
        ));

        for column in columns {
            self.draw_column(page, column, top);
        }
    }

    fn draw_column(&mut self, page: &PageFrame, column: &ColumnFrame<'_>, top: f32) {
        let params = self.layout.params;
        let mut used = 0.0f32;
        for (key, indices) in column.slots {
            let mut after_title = false;
            if self.is_titled(page.index, column.index, key) {
                if used > 0.0 {
                    used += params.gap;
                }
                self.rect(
                    page,
                    column.x,
                    top + used,
                    column.width,
                    params.title_height,
                    &format!(r#"fill="{TITLE_FILL}""#),
                );
                self.label(page, column.x, top + used, &format!("{key} title"));
                used += params.title_height + params.gap;
                after_title = true;
            }
            for &index in indices {
                let id = slot_entry_id(self.document, key, index);
                let h = self.layout.measurements.heights.get(&id);
                if used > 0.0 && !after_title {
                    used += params.gap;
                }
                after_title = false;
                self.rect(
                    page,
                    column.x,
                    top + used,
                    column.width,
                    h,
                    &format!(r#"fill="{ENTRY_FILL}" stroke="{PAGE_STROKE}""#),
                );
                self.label(page, column.x, top + used, &format!("{key}[{index}] h={h:.0}"));
                used += h;
            }
        }
    }
}

/// Renders `layout` as a standalone SVG document. Non-positive scales fall
/// back to `DEFAULT_SCALE`.
pub fn render_debug_svg(document: &ResumeDocument, layout: &Layout, scale: f32) -> String {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { DEFAULT_SCALE };
    let g = layout.geometry;
    let page_w = g.page_width * scale;
    let page_h = g.page_height * scale;
    let count = layout.page_count().max(1) as f32;
    let total_w = PAGE_SPACING + count * (page_w + PAGE_SPACING);
    let total_h = page_h + 2.0 * PAGE_SPACING;

    let mut canvas = Canvas {
        document,
        layout,
        scale,
        out: format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{total_w:.0}" height="{total_h:.0}" viewBox="0 0 {total_w:.1} {total_h:.1}" font-family="monospace" font-size="9">"#
        ),
    };

    let frame = |index: usize, available_height: f32, overflowed: bool| PageFrame {
        index,
        origin_x: PAGE_SPACING + index as f32 * (page_w + PAGE_SPACING),
        origin_y: PAGE_SPACING,
        available_height,
        overflowed,
    };

    match &layout.plan {
        PagePlan::TwoColumn(pages) => {
            let left_w = g.column_width(Column::Left);
            for (i, page) in pages.iter().enumerate() {
                let columns = [
                    ColumnFrame { index: 0, x: g.margin, width: left_w, slots: &page.left },
                    ColumnFrame {
                        index: 1,
                        x: g.margin + left_w + COLUMN_GAP_PX,
                        width: g.column_width(Column::Right),
                        slots: &page.right,
                    },
                ];
                canvas.draw_page(&frame(i, page.available_height, page.overflowed), &columns);
            }
        }
        PagePlan::SingleColumn(pages) => {
            for (i, page) in pages.iter().enumerate() {
                let columns = [ColumnFrame {
                    index: 0,
                    x: g.margin,
                    width: g.content_width(),
                    slots: &page.items,
                }];
                canvas.draw_page(&frame(i, page.available_height, page.overflowed), &columns);
            }
        }
    }

    canvas.out.push_str("</svg>");
    canvas.out
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::engine::LayoutEngine;
    use crate::layout::geometry::PageFormat;
    use crate::layout::measure::{CorrectionFactors, Measurer, RenderSpec};
    use crate::models::{ColumnLayout, DesignConfig, Template};
    use serde_json::json;
    use std::sync::Arc;

    struct ConstMeasurer(f32);

    impl Measurer for ConstMeasurer {
        fn measure(&self, _spec: &RenderSpec, _design: &DesignConfig) -> f32 {
            self.0
        }
    }

    fn make_layout(template: Template, height: f32) -> (ResumeDocument, Layout) {
        let mut doc = ResumeDocument {
            template,
            layout: ColumnLayout {
                left: vec!["experience".into()],
                right: vec!["myTime".into()],
            },
            ..ResumeDocument::default()
        };
        doc.set_section("experience", json!([{ "title": "A" }, { "title": "B" }]));
        doc.set_section("myTime", json!([{ "label": "Work", "value": 60 }]));
        let layout = LayoutEngine::new(PageFormat::A4, CorrectionFactors::default())
            .with_measurer(Arc::new(ConstMeasurer(height)))
            .compute(&doc);
        (doc, layout)
    }

    #[test]
    fn test_svg_labels_every_placed_entry() {
        let (doc, layout) = make_layout(Template::Modern, 50.0);
        let svg = render_debug_svg(&doc, &layout, 0.5);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("experience[0] h=50"));
        assert!(svg.contains("experience[1] h=50"));
        assert!(svg.contains("myTime[0] h=50"));
        assert!(svg.contains("stroke-dasharray"));
        assert!(!svg.contains(OVERFLOW_STROKE));
    }

    #[test]
    fn test_overflowed_pages_are_outlined_in_red() {
        let (doc, layout) = make_layout(Template::Ats, 5000.0);
        let svg = render_debug_svg(&doc, &layout, 0.25);

        assert_eq!(layout.plan.overflowed_pages().len(), layout.page_count());
        assert_eq!(svg.matches(OVERFLOW_STROKE).count(), layout.page_count());
    }

    #[test]
    fn test_one_page_outline_per_page() {
        let (doc, layout) = make_layout(Template::Ats, 600.0);
        let svg = render_debug_svg(&doc, &layout, 0.0);

        assert_eq!(svg.matches(r#"fill="white""#).count(), layout.page_count());
        assert!(svg.contains("page 2"));
    }

    #[test]
    fn test_labels_are_escaped() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
