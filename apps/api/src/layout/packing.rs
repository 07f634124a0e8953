//! Packing — greedy assignment of measured entries to pages.
//!
//! Both variants make a single forward pass. Each page gets a height budget;
//! entries are appended to a column while they fit, and a column that
//! rejects an entry is closed for that page. Entries are never reordered and
//! only unbreakable sections are guaranteed not to split (they are a single
//! entry). If a page would otherwise stay empty, the starvation guard places
//! one entry anyway so oversized content still makes progress.
//!
//! Section titles are billed once per section for the whole document. A
//! section that resumes on a later page gets no title there; the renderer
//! follows the same rule by only titling the fragment holding the section's
//! first index.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::layout::entries::{first_indices, Entry};
use crate::layout::measure::MeasuredHeights;

/// `section key → entry indices` for one column of one page, in placement order.
pub type SectionSlots = IndexMap<String, Vec<usize>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoColumnPage {
    pub left: SectionSlots,
    pub right: SectionSlots,
    pub left_height: f32,
    pub right_height: f32,
    pub available_height: f32,
    /// Set when the starvation guard placed an entry over budget.
    pub overflowed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleColumnPage {
    pub items: SectionSlots,
    pub height: f32,
    pub available_height: f32,
    pub overflowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackingParams {
    /// Budget of page 0, already reduced by the header.
    pub first_page_height: f32,
    pub page_height: f32,
    pub gap: f32,
    pub title_height: f32,
}

impl PackingParams {
    pub fn available(&self, page_index: usize) -> f32 {
        if page_index == 0 {
            self.first_page_height
        } else {
            self.page_height
        }
    }
}

/// Packed pages of one pass, tagged with the variant that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", content = "pages", rename_all = "camelCase")]
pub enum PagePlan {
    TwoColumn(Vec<TwoColumnPage>),
    SingleColumn(Vec<SingleColumnPage>),
}

impl PagePlan {
    pub fn len(&self) -> usize {
        match self {
            PagePlan::TwoColumn(pages) => pages.len(),
            PagePlan::SingleColumn(pages) => pages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of pages where the starvation guard fired.
    pub fn overflowed_pages(&self) -> Vec<usize> {
        let flags: Vec<bool> = match self {
            PagePlan::TwoColumn(pages) => pages.iter().map(|p| p.overflowed).collect(),
            PagePlan::SingleColumn(pages) => pages.iter().map(|p| p.overflowed).collect(),
        };
        flags
            .into_iter()
            .enumerate()
            .filter_map(|(i, overflowed)| overflowed.then_some(i))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared machinery
// ────────────────────────────────────────────────────────────────────────────

/// Decides which entry pays for its section's title.
enum TitleBilling {
    /// Two-column: the first entry of a section placed anywhere.
    FirstAppearance(HashSet<String>),
    /// Single-column: the entry holding the section's first index.
    FirstIndex(HashMap<String, usize>),
}

impl TitleBilling {
    fn bills(&self, entry: &Entry) -> bool {
        match self {
            TitleBilling::FirstAppearance(titled) => !titled.contains(&entry.section_key),
            TitleBilling::FirstIndex(firsts) => firsts.get(&entry.section_key) == Some(&entry.index),
        }
    }

    fn record(&mut self, entry: &Entry) {
        if let TitleBilling::FirstAppearance(titled) = self {
            titled.insert(entry.section_key.clone());
        }
    }
}

/// Placement state of one column across pages.
struct ColumnCursor<'a> {
    items: &'a [Entry],
    next: usize,
    used: f32,
    full: bool,
}

impl<'a> ColumnCursor<'a> {
    fn new(items: &'a [Entry]) -> Self {
        ColumnCursor {
            items,
            next: 0,
            used: 0.0,
            full: false,
        }
    }

    fn exhausted(&self) -> bool {
        self.next >= self.items.len()
    }

    fn open_page(&mut self) {
        self.used = 0.0;
        self.full = false;
    }

    fn candidate_height(
        &self,
        entry: &Entry,
        heights: &MeasuredHeights,
        params: &PackingParams,
        billing: &TitleBilling,
    ) -> f32 {
        let mut h = heights.get(&entry.id);
        if billing.bills(entry) {
            h += params.title_height + params.gap;
        }
        if self.used > 0.0 {
            h += params.gap;
        }
        h
    }

    fn commit(&mut self, slots: &mut SectionSlots, height: f32, billing: &mut TitleBilling) -> &'a Entry {
        let items = self.items;
        let entry = &items[self.next];
        slots
            .entry(entry.section_key.clone())
            .or_default()
            .push(entry.index);
        billing.record(entry);
        self.used += height;
        self.next += 1;
        entry
    }

    /// Places the next entry if it fits in `budget`; otherwise closes the
    /// column for this page.
    fn try_place(
        &mut self,
        slots: &mut SectionSlots,
        heights: &MeasuredHeights,
        params: &PackingParams,
        budget: f32,
        billing: &mut TitleBilling,
    ) -> bool {
        if self.full || self.exhausted() {
            return false;
        }
        let h = self.candidate_height(&self.items[self.next], heights, params, billing);
        if self.used + h <= budget {
            self.commit(slots, h, billing);
            true
        } else {
            self.full = true;
            false
        }
    }

    /// Places the next entry regardless of budget.
    fn force_place(
        &mut self,
        slots: &mut SectionSlots,
        heights: &MeasuredHeights,
        params: &PackingParams,
        billing: &mut TitleBilling,
    ) -> &'a Entry {
        let h = self.candidate_height(&self.items[self.next], heights, params, billing);
        self.commit(slots, h, billing)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Two-column variant
// ────────────────────────────────────────────────────────────────────────────

/// Packs two independently flowing columns that share page breaks.
pub fn pack_two_column(
    left: &[Entry],
    right: &[Entry],
    heights: &MeasuredHeights,
    params: &PackingParams,
) -> Vec<TwoColumnPage> {
    let mut pages = Vec::new();
    let mut l = ColumnCursor::new(left);
    let mut r = ColumnCursor::new(right);
    let mut billing = TitleBilling::FirstAppearance(HashSet::new());

    while !l.exhausted() || !r.exhausted() {
        let budget = params.available(pages.len());
        let mut page = TwoColumnPage {
            available_height: budget,
            ..TwoColumnPage::default()
        };
        l.open_page();
        r.open_page();

        let mut placed = 0usize;
        loop {
            let mut progressed = false;
            if l.try_place(&mut page.left, heights, params, budget, &mut billing) {
                placed += 1;
                progressed = true;
            }
            if r.try_place(&mut page.right, heights, params, budget, &mut billing) {
                placed += 1;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        if placed == 0 {
            let forced = if !l.exhausted() {
                l.force_place(&mut page.left, heights, params, &mut billing)
            } else {
                r.force_place(&mut page.right, heights, params, &mut billing)
            };
            page.overflowed = true;
            warn!(
                page = pages.len(),
                id = %forced.id,
                budget,
                "entry exceeds an empty page, force-placed"
            );
        }

        page.left_height = l.used;
        page.right_height = r.used;
        pages.push(page);
    }

    debug!(
        pages = pages.len(),
        left = left.len(),
        right = right.len(),
        "two-column packing complete"
    );
    pages
}

// ────────────────────────────────────────────────────────────────────────────
// Single-column variant
// ────────────────────────────────────────────────────────────────────────────

pub fn pack_single_column(
    items: &[Entry],
    heights: &MeasuredHeights,
    params: &PackingParams,
) -> Vec<SingleColumnPage> {
    let mut pages = Vec::new();
    let mut c = ColumnCursor::new(items);
    let mut billing = TitleBilling::FirstIndex(first_indices(items));

    while !c.exhausted() {
        let budget = params.available(pages.len());
        let mut page = SingleColumnPage {
            available_height: budget,
            ..SingleColumnPage::default()
        };
        c.open_page();

        let mut placed = 0usize;
        while c.try_place(&mut page.items, heights, params, budget, &mut billing) {
            placed += 1;
        }

        if placed == 0 {
            let forced = c.force_place(&mut page.items, heights, params, &mut billing);
            page.overflowed = true;
            warn!(
                page = pages.len(),
                id = %forced.id,
                budget,
                "entry exceeds an empty page, force-placed"
            );
        }

        page.height = c.used;
        pages.push(page);
    }

    debug!(pages = pages.len(), items = items.len(), "single-column packing complete");
    pages
}
