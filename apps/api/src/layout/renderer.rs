//! Page Renderer — turns a packed page plan into per-page render output.
//!
//! Section renderers are pass-through consumers of their section's value.
//! Given an index list they emit only those entries as read-only fragments;
//! without one they emit the full value for the live editor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::layout::entries::{
    column_entries, first_indices, is_unbreakable, ordered_entries, UNBREAKABLE_SECTIONS,
};
use crate::layout::packing::{PagePlan, SectionSlots};
use crate::models::{Column, DesignConfig, ResumeDocument};

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Restricts output to these entry indices (paginated view).
    pub items_to_render: Option<&'a [usize]>,
    pub design: &'a DesignConfig,
    /// Hidden measurement pass: no interactive affordances.
    pub is_measuring: bool,
}

impl RenderOptions<'_> {
    fn editable(&self) -> bool {
        self.items_to_render.is_none() && !self.is_measuring
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// Array index of the entry; absent for whole-value sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub data: Value,
    pub editable: bool,
}

pub trait SectionRenderer: Send + Sync {
    fn render(&self, data: &Value, options: &RenderOptions<'_>) -> Vec<Fragment>;
}

/// Array-backed sections: one fragment per entry.
#[derive(Debug, Default)]
pub struct ListRenderer;

impl SectionRenderer for ListRenderer {
    fn render(&self, data: &Value, options: &RenderOptions<'_>) -> Vec<Fragment> {
        let items = match data {
            Value::Array(items) => items,
            other => return BlockRenderer.render(other, options),
        };
        let editable = options.editable();
        match options.items_to_render {
            Some(indices) => indices
                .iter()
                .filter_map(|&i| items.get(i).map(|item| (i, item)))
                .filter(|(_, item)| !item.is_null())
                .map(|(i, item)| Fragment {
                    index: Some(i),
                    data: item.clone(),
                    editable,
                })
                .collect(),
            None => items
                .iter()
                .enumerate()
                .map(|(i, item)| Fragment {
                    index: Some(i),
                    data: item.clone(),
                    editable,
                })
                .collect(),
        }
    }
}

/// Unbreakable and single-value sections: the whole value, atomically.
#[derive(Debug, Default)]
pub struct BlockRenderer;

impl SectionRenderer for BlockRenderer {
    fn render(&self, data: &Value, options: &RenderOptions<'_>) -> Vec<Fragment> {
        if data.is_null() || options.items_to_render.is_some_and(|i| i.is_empty()) {
            return Vec::new();
        }
        vec![Fragment {
            index: None,
            data: data.clone(),
            editable: options.editable(),
        }]
    }
}

/// Section renderers by key, with list/block defaults for everything else.
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn SectionRenderer>>,
    list: Arc<dyn SectionRenderer>,
    block: Arc<dyn SectionRenderer>,
}

impl Default for RendererRegistry {
    /// Unbreakable sections render as one block even when array-backed.
    fn default() -> Self {
        let block: Arc<dyn SectionRenderer> = Arc::new(BlockRenderer);
        let mut registry = RendererRegistry {
            renderers: HashMap::new(),
            list: Arc::new(ListRenderer),
            block: Arc::clone(&block),
        };
        for key in UNBREAKABLE_SECTIONS {
            registry.register(*key, Arc::clone(&block));
        }
        registry
    }
}

impl RendererRegistry {
    pub fn register(&mut self, section_key: impl Into<String>, renderer: Arc<dyn SectionRenderer>) {
        self.renderers.insert(section_key.into(), renderer);
    }

    pub fn renderer_for(&self, section_key: &str, data: &Value) -> &dyn SectionRenderer {
        if let Some(r) = self.renderers.get(section_key) {
            return r.as_ref();
        }
        if data.is_array() && !is_unbreakable(section_key) {
            self.list.as_ref()
        } else {
            self.block.as_ref()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSection {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedColumn {
    /// Absent for the single-column template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<Column>,
    pub sections: Vec<RenderedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Value>,
    pub columns: Vec<RenderedColumn>,
}

/// "industrialExpertise" → "Industrial Expertise".
pub fn section_title(key: &str) -> String {
    let mut title = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if i == 0 {
            title.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            title.push(' ');
            title.push(c);
        } else if c == '_' || c == '-' {
            title.push(' ');
        } else {
            title.push(c);
        }
    }
    title
}

/// Column contents of one page.
pub enum PageSlots<'a> {
    Two { left: &'a SectionSlots, right: &'a SectionSlots },
    Single(&'a SectionSlots),
}

pub struct PageRenderer<'a> {
    document: &'a ResumeDocument,
    registry: &'a RendererRegistry,
    firsts: HashMap<String, usize>,
}

impl<'a> PageRenderer<'a> {
    pub fn two_column(document: &'a ResumeDocument, registry: &'a RendererRegistry) -> Self {
        let mut entries = column_entries(document, Column::Left);
        entries.extend(column_entries(document, Column::Right));
        PageRenderer {
            document,
            registry,
            firsts: first_indices(&entries),
        }
    }

    pub fn single_column(document: &'a ResumeDocument, registry: &'a RendererRegistry) -> Self {
        PageRenderer {
            document,
            registry,
            firsts: first_indices(&ordered_entries(document)),
        }
    }

    fn render_column(&self, column: Option<Column>, slots: &SectionSlots) -> RenderedColumn {
        let sections = slots
            .iter()
            .filter_map(|(key, indices)| {
                let data = self.document.section(key)?;
                let options = RenderOptions {
                    items_to_render: Some(indices.as_slice()),
                    design: &self.document.design,
                    is_measuring: false,
                };
                let fragments = self.registry.renderer_for(key, data).render(data, &options);
                let titled = self
                    .firsts
                    .get(key)
                    .is_some_and(|first| indices.contains(first));
                Some(RenderedSection {
                    key: key.clone(),
                    title: titled.then(|| section_title(key)),
                    fragments,
                })
            })
            .collect();
        RenderedColumn { column, sections }
    }

    /// Renders one page. The header only appears on page 0.
    pub fn render_page(&self, index: usize, slots: PageSlots<'_>) -> RenderedPage {
        let header = if index == 0 {
            self.document.header().cloned()
        } else {
            None
        };
        let columns = match slots {
            PageSlots::Two { left, right } => vec![
                self.render_column(Some(Column::Left), left),
                self.render_column(Some(Column::Right), right),
            ],
            PageSlots::Single(items) => vec![self.render_column(None, items)],
        };
        RenderedPage {
            index,
            header,
            columns,
        }
    }
}

/// Renders every page of a plan with the renderer matching its variant.
pub fn render_pages(
    document: &ResumeDocument,
    plan: &PagePlan,
    registry: &RendererRegistry,
) -> Vec<RenderedPage> {
    match plan {
        PagePlan::TwoColumn(pages) => {
            let renderer = PageRenderer::two_column(document, registry);
            pages
                .iter()
                .enumerate()
                .map(|(i, page)| {
                    renderer.render_page(
                        i,
                        PageSlots::Two {
                            left: &page.left,
                            right: &page.right,
                        },
                    )
                })
                .collect()
        }
        PagePlan::SingleColumn(pages) => {
            let renderer = PageRenderer::single_column(document, registry);
            pages
                .iter()
                .enumerate()
                .map(|(i, page)| renderer.render_page(i, PageSlots::Single(&page.items)))
                .collect()
        }
    }
}

/// Full, unrestricted, editable rendering of every visible section, in
/// layout order, for the live editor outside pagination.
pub fn render_editing(document: &ResumeDocument, registry: &RendererRegistry) -> Vec<RenderedSection> {
    let mut seen = std::collections::HashSet::new();
    document
        .layout
        .left
        .iter()
        .chain(document.layout.right.iter())
        .filter(|key| seen.insert(*key))
        .filter(|key| document.is_visible(key))
        .filter_map(|key| {
            let data = document.section(key)?;
            let options = RenderOptions {
                items_to_render: None,
                design: &document.design,
                is_measuring: false,
            };
            Some(RenderedSection {
                key: key.clone(),
                title: Some(section_title(key)),
                fragments: registry.renderer_for(key, data).render(data, &options),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnLayout;
    use serde_json::json;

    fn make_document() -> ResumeDocument {
        let mut doc = ResumeDocument {
            layout: ColumnLayout {
                left: vec!["experience".into()],
                right: vec!["skills".into(), "myTime".into()],
            },
            ..ResumeDocument::default()
        };
        doc.set_section("personalInfo", json!({ "name": "Ada" }));
        doc.set_section(
            "experience",
            json!([{ "title": "A" }, { "title": "B" }, { "title": "C" }]),
        );
        doc.set_section("skills", json!(["Rust", "SQL"]));
        doc.set_section("myTime", json!([{ "label": "Work", "value": 60 }]));
        doc
    }

    fn slots(pairs: Vec<(&str, Vec<usize>)>) -> SectionSlots {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_section_title_splits_camel_case() {
        assert_eq!(section_title("industrialExpertise"), "Industrial Expertise");
        assert_eq!(section_title("myTime"), "My Time");
        assert_eq!(section_title("experience"), "Experience");
        assert_eq!(section_title("side_projects"), "Side projects");
    }

    #[test]
    fn test_list_renderer_restricts_to_indices() {
        let design = DesignConfig::default();
        let options = RenderOptions {
            items_to_render: Some(&[2, 0, 9][..]),
            design: &design,
            is_measuring: false,
        };
        let fragments = ListRenderer.render(&json!(["a", "b", "c"]), &options);
        let picked: Vec<Option<usize>> = fragments.iter().map(|f| f.index).collect();
        assert_eq!(picked, vec![Some(2), Some(0)]);
        assert!(fragments.iter().all(|f| !f.editable));
    }

    #[test]
    fn test_editing_mode_is_editable_unless_measuring() {
        let design = DesignConfig::default();
        let editing = RenderOptions {
            items_to_render: None,
            design: &design,
            is_measuring: false,
        };
        let measuring = RenderOptions {
            is_measuring: true,
            ..editing
        };
        assert!(ListRenderer.render(&json!(["a"]), &editing)[0].editable);
        assert!(!ListRenderer.render(&json!(["a"]), &measuring)[0].editable);
    }

    #[test]
    fn test_block_renderer_is_all_or_nothing() {
        let design = DesignConfig::default();
        let none = RenderOptions {
            items_to_render: Some(&[] as &[usize]),
            design: &design,
            is_measuring: false,
        };
        assert!(BlockRenderer.render(&json!("text"), &none).is_empty());
        let all = RenderOptions {
            items_to_render: Some(&[0][..]),
            ..none
        };
        assert_eq!(BlockRenderer.render(&json!("text"), &all).len(), 1);
    }

    #[test]
    fn test_header_only_on_first_page() {
        let doc = make_document();
        let registry = RendererRegistry::default();
        let renderer = PageRenderer::two_column(&doc, &registry);
        let empty = SectionSlots::new();

        let first = renderer.render_page(0, PageSlots::Two { left: &empty, right: &empty });
        let second = renderer.render_page(1, PageSlots::Two { left: &empty, right: &empty });

        assert!(first.header.is_some());
        assert!(second.header.is_none());
        assert_eq!(first.columns.len(), 2);
    }

    #[test]
    fn test_resumed_section_has_no_title() {
        let doc = make_document();
        let registry = RendererRegistry::default();
        let renderer = PageRenderer::two_column(&doc, &registry);
        let right = SectionSlots::new();

        let page0 = renderer.render_page(0, PageSlots::Two { left: &slots(vec![("experience", vec![0, 1])]), right: &right });
        let page1 = renderer.render_page(1, PageSlots::Two { left: &slots(vec![("experience", vec![2])]), right: &right });

        let first = &page0.columns[0].sections[0];
        assert_eq!(first.title.as_deref(), Some("Experience"));
        assert_eq!(first.fragments.len(), 2);
        let resumed = &page1.columns[0].sections[0];
        assert!(resumed.title.is_none());
        assert_eq!(resumed.fragments[0].index, Some(2));
    }

    #[test]
    fn test_sections_render_in_slot_order_with_unbreakable_block_whole() {
        let doc = make_document();
        let registry = RendererRegistry::default();
        let renderer = PageRenderer::single_column(&doc, &registry);

        let page = renderer.render_page(0, PageSlots::Single(&slots(vec![("myTime", vec![0]), ("skills", vec![0, 1])])));

        let keys: Vec<&str> = page.columns[0].sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["myTime", "skills"]);
        assert_eq!(page.columns[0].sections[0].fragments.len(), 1);
        assert!(page.columns[0].sections[0].fragments[0].data.is_array());
        assert!(page.columns[0].column.is_none());
    }

    #[test]
    fn test_registered_renderer_overrides_default() {
        struct Upper;
        impl SectionRenderer for Upper {
            fn render(&self, data: &Value, _options: &RenderOptions<'_>) -> Vec<Fragment> {
                vec![Fragment {
                    index: None,
                    data: json!(data.as_str().unwrap_or_default().to_uppercase()),
                    editable: false,
                }]
            }
        }
        let mut registry = RendererRegistry::default();
        registry.register("summary", Arc::new(Upper));
        let design = DesignConfig::default();
        let options = RenderOptions { items_to_render: None, design: &design, is_measuring: false };
        let out = registry.renderer_for("summary", &json!("hi")).render(&json!("hi"), &options);
        assert_eq!(out[0].data, json!("HI"));
    }

    #[test]
    fn test_render_editing_covers_visible_sections() {
        let mut doc = make_document();
        doc.set_visibility("skills", false);
        let sections = render_editing(&doc, &RendererRegistry::default());
        let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["experience", "myTime"]);
        assert!(sections[0].fragments.iter().all(|f| f.editable));
        assert_eq!(sections[0].fragments.len(), 3);
    }

    #[test]
    fn test_render_pages_follows_plan_variant() {
        use crate::layout::packing::SingleColumnPage;

        let doc = make_document();
        let plan = PagePlan::SingleColumn(vec![
            SingleColumnPage {
                items: slots(vec![("experience", vec![0, 1])]),
                ..SingleColumnPage::default()
            },
            SingleColumnPage {
                items: slots(vec![("experience", vec![2]), ("skills", vec![0, 1])]),
                ..SingleColumnPage::default()
            },
        ]);

        let pages = render_pages(&doc, &plan, &RendererRegistry::default());

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].index, 1);
        assert_eq!(pages[1].columns.len(), 1);
        let titles: Vec<Option<&str>> = pages[1].columns[0]
            .sections
            .iter()
            .map(|s| s.title.as_deref())
            .collect();
        assert_eq!(titles, vec![None, Some("Skills")]);
    }
}
