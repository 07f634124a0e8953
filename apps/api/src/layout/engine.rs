//! Layout pipeline and pass scheduling.
//!
//! # Architecture
//! - `LayoutEngine::compute` is the pure pipeline: measure, pack, render.
//!   Identical inputs give an identical `Layout`; nothing is cached between runs.
//! - `LayoutScheduler` owns the latest committed layout of one document.
//!   Passes are keyed by the edit revision of their input, not by the order
//!   they were scheduled in. A new pass aborts the pending one; a pass for an
//!   older revision than one already scheduled is never queued.
//!   A pass yields once before measuring (the frame tick the measurement read
//!   waits for), runs the CPU-bound pipeline via `tokio::task::spawn_blocking`,
//!   and commits only if no newer revision was scheduled meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::layout::entries::{column_entries, ordered_entries};
use crate::layout::geometry::{PageFormat, PageGeometry, ITEM_GAP_PX};
use crate::layout::measure::{
    CorrectionFactors, MeasurementBuffer, Measurements, Measurer, TextMetricsMeasurer,
};
use crate::layout::packing::{pack_single_column, pack_two_column, PackingParams, PagePlan};
use crate::layout::renderer::{
    render_editing, render_pages, RenderedPage, RenderedSection, RendererRegistry,
};
use crate::models::{Column, ResumeDocument, Template};

/// Upper bound on how long a caller waits for its pass to commit.
const PASS_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one full pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub template: Template,
    pub geometry: PageGeometry,
    pub corrections: CorrectionFactors,
    pub measurements: Measurements,
    pub params: PackingParams,
    pub plan: PagePlan,
    pub pages: Vec<RenderedPage>,
}

impl Layout {
    pub fn page_count(&self) -> usize {
        self.plan.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LayoutEngine {
    measurer: Arc<dyn Measurer>,
    registry: Arc<RendererRegistry>,
    format: PageFormat,
    /// Applied on top of each template's defaults.
    corrections: CorrectionFactors,
}

impl LayoutEngine {
    pub fn new(format: PageFormat, corrections: CorrectionFactors) -> Self {
        LayoutEngine {
            measurer: Arc::new(TextMetricsMeasurer),
            registry: Arc::new(RendererRegistry::default()),
            format,
            corrections,
        }
    }

    pub fn with_measurer(mut self, measurer: Arc<dyn Measurer>) -> Self {
        self.measurer = measurer;
        self
    }

    /// Installs section renderers used by both the hidden measurement pass
    /// and the paginated output.
    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Unpaginated, editable rendering for the live editor.
    pub fn render_editing(&self, document: &ResumeDocument) -> Vec<RenderedSection> {
        render_editing(document, &self.registry)
    }

    pub fn compute(&self, document: &ResumeDocument) -> Layout {
        self.compute_with_corrections(document, &CorrectionFactors::default())
    }

    /// Runs a pass with per-request correction overrides, which win over
    /// both the template defaults and the engine-wide overrides.
    pub fn compute_with_corrections(
        &self,
        document: &ResumeDocument,
        extra: &CorrectionFactors,
    ) -> Layout {
        let corrections = CorrectionFactors::defaults_for(document.template)
            .merged(&self.corrections)
            .merged(extra);
        let geometry = PageGeometry::new(self.format, &document.design);

        let measurements = MeasurementBuffer::new(self.measurer.as_ref(), &document.design, &corrections)
            .with_renderers(&self.registry)
            .measure(document, &geometry);

        let params = PackingParams {
            first_page_height: geometry.available_height(true, measurements.header_height),
            page_height: geometry.available_height(false, 0.0),
            gap: ITEM_GAP_PX,
            title_height: measurements.title_height,
        };

        let plan = match document.template {
            Template::Modern => PagePlan::TwoColumn(pack_two_column(
                &column_entries(document, Column::Left),
                &column_entries(document, Column::Right),
                &measurements.heights,
                &params,
            )),
            Template::Ats => PagePlan::SingleColumn(pack_single_column(
                &ordered_entries(document),
                &measurements.heights,
                &params,
            )),
        };

        let pages = render_pages(document, &plan, &self.registry);

        debug!(
            template = ?document.template,
            pages = plan.len(),
            entries = measurements.heights.len(),
            overflowed = plan.overflowed_pages().len(),
            "layout pass complete"
        );

        Layout {
            template: document.template,
            geometry,
            corrections,
            measurements,
            params,
            plan,
            pages,
        }
    }

    /// Same as `compute_with_corrections`, off the async executor.
    pub async fn compute_blocking(
        &self,
        document: ResumeDocument,
        extra: CorrectionFactors,
    ) -> Result<Layout, AppError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.compute_with_corrections(&document, &extra))
            .await
            .map_err(|e| AppError::Internal(anyhow!("Layout task panicked: {e}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scheduler
// ────────────────────────────────────────────────────────────────────────────

/// A committed pass: the layout together with the input it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSnapshot {
    /// Edit revision of `document`, assigned by the caller.
    pub revision: u64,
    pub document: ResumeDocument,
    pub layout: Layout,
}

struct SchedulerInner {
    engine: LayoutEngine,
    /// Highest revision scheduled so far.
    requested: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    committed: watch::Sender<Option<Arc<LayoutSnapshot>>>,
}

impl SchedulerInner {
    fn is_current(&self, revision: u64) -> bool {
        self.requested.load(Ordering::SeqCst) == revision
    }

    /// Stale passes are dropped; a commit never replaces a newer revision.
    fn commit(&self, snapshot: LayoutSnapshot) -> bool {
        let revision = snapshot.revision;
        if !self.is_current(revision) {
            debug!(revision, "layout pass superseded before commit");
            return false;
        }
        self.committed.send_if_modified(move |committed| {
            if committed.as_ref().is_some_and(|c| c.revision >= revision) {
                return false;
            }
            *committed = Some(Arc::new(snapshot));
            true
        })
    }
}

/// Serialises layout passes for one document: the newest revision wins,
/// whatever order passes are scheduled in.
#[derive(Clone)]
pub struct LayoutScheduler {
    inner: Arc<SchedulerInner>,
}

impl LayoutScheduler {
    pub fn new(engine: LayoutEngine) -> Self {
        let (committed, _) = watch::channel(None);
        LayoutScheduler {
            inner: Arc::new(SchedulerInner {
                engine,
                requested: AtomicU64::new(0),
                pending: Mutex::new(None),
                committed,
            }),
        }
    }

    /// Queues a pass for `document` at `revision`, cancelling any pending
    /// pass. Returns false without queueing when a newer revision is already
    /// scheduled.
    pub fn schedule(&self, revision: u64, document: ResumeDocument) -> bool {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let newest = self.inner.requested.fetch_max(revision, Ordering::SeqCst);
        if revision < newest {
            debug!(revision, newest, "layout pass for an older revision skipped");
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::task::yield_now().await;
            if !inner.is_current(revision) {
                return;
            }
            let engine = inner.engine.clone();
            let computed = tokio::task::spawn_blocking(move || {
                let layout = engine.compute(&document);
                LayoutSnapshot {
                    revision,
                    document,
                    layout,
                }
            })
            .await;
            match computed {
                Ok(snapshot) => {
                    inner.commit(snapshot);
                }
                Err(e) => warn!(revision, "layout pass failed: {e}"),
            }
        });

        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        true
    }

    /// Waits until `revision`, or a newer one, has committed.
    pub async fn wait(&self, revision: u64) -> Result<Arc<LayoutSnapshot>, AppError> {
        let mut rx = self.inner.committed.subscribe();
        let committed = tokio::time::timeout(
            PASS_TIMEOUT,
            rx.wait_for(|c| c.as_ref().is_some_and(|s| s.revision >= revision)),
        )
        .await
        .map_err(|_| AppError::Internal(anyhow!("Layout pass {revision} timed out")))?
        .map_err(|e| AppError::Internal(anyhow!("Layout channel closed: {e}")))?;

        (*committed)
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow!("No layout committed")))
    }

    /// Schedules a pass and waits until it, or a newer one, has committed.
    /// The snapshot returned pairs the layout with the document it was
    /// computed from, which is newer than `document` if an edit overtook it.
    pub async fn run(
        &self,
        revision: u64,
        document: ResumeDocument,
    ) -> Result<Arc<LayoutSnapshot>, AppError> {
        self.schedule(revision, document);
        self.wait(revision).await
    }

    /// Last committed snapshot, if any pass has finished.
    pub fn latest(&self) -> Option<Arc<LayoutSnapshot>> {
        self.inner.committed.borrow().clone()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::measure::RenderSpec;
    use crate::layout::renderer::{Fragment, RenderOptions, SectionRenderer};
    use crate::models::{ColumnLayout, DesignConfig};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const TITLE: f32 = 30.0;

    /// Heights by spec id; titles are fixed, unknown ids use `default`.
    struct FixedMeasurer {
        heights: HashMap<String, f32>,
        default: f32,
    }

    impl Measurer for FixedMeasurer {
        fn measure(&self, spec: &RenderSpec, _design: &DesignConfig) -> f32 {
            if spec.id == "title" {
                return TITLE;
            }
            self.heights.get(&spec.id).copied().unwrap_or(self.default)
        }
    }

    fn make_engine(heights: &[(&str, f32)], default: f32) -> LayoutEngine {
        let measurer = FixedMeasurer {
            heights: heights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            default,
        };
        LayoutEngine::new(PageFormat::A4, CorrectionFactors::default())
            .with_measurer(Arc::new(measurer))
    }

    fn budget() -> f32 {
        PageGeometry::new(PageFormat::A4, &DesignConfig::default()).available_height(true, 0.0)
    }

    fn make_document(template: Template, left: &[&str], right: &[&str]) -> ResumeDocument {
        ResumeDocument {
            template,
            layout: ColumnLayout {
                left: left.iter().map(|s| s.to_string()).collect(),
                right: right.iter().map(|s| s.to_string()).collect(),
            },
            ..ResumeDocument::default()
        }
    }

    fn jobs(n: usize) -> Value {
        Value::Array((0..n).map(|i| json!({ "title": format!("Job {i}") })).collect())
    }

    fn two_column(layout: &Layout) -> &[crate::layout::packing::TwoColumnPage] {
        match &layout.plan {
            PagePlan::TwoColumn(pages) => pages,
            PagePlan::SingleColumn(_) => panic!("expected a two-column plan"),
        }
    }

    #[test]
    fn test_single_short_resume_fits_one_page() {
        let mut doc = make_document(Template::Modern, &["summary", "skills"], &[]);
        doc.set_section("summary", json!("Ships reliable systems."));
        doc.set_section("skills", json!(["Rust", "SQL", "Tokio"]));
        let engine = make_engine(&[], 40.0);

        let layout = engine.compute(&doc);

        let pages = two_column(&layout);
        assert_eq!(pages.len(), 1);
        let keys: Vec<&str> = pages[0].left.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["summary", "skills"]);
        assert_eq!(pages[0].left["skills"], vec![0, 1, 2]);
        assert!(layout.plan.overflowed_pages().is_empty());
    }

    #[test]
    fn test_overflow_into_second_page_bills_title_once() {
        let mut doc = make_document(Template::Modern, &["experience"], &[]);
        doc.set_section("experience", jobs(10));
        let engine = make_engine(&[], budget() * 0.4);

        let layout = engine.compute(&doc);

        let pages = two_column(&layout);
        assert_eq!(pages[0].left["experience"], vec![0, 1]);
        assert_eq!(pages[1].left["experience"], vec![2, 3]);
        assert_eq!(pages.len(), 5);
        let titled: Vec<bool> = layout
            .pages
            .iter()
            .map(|p| p.columns[0].sections[0].title.is_some())
            .collect();
        assert_eq!(titled, vec![true, false, false, false, false]);
    }

    #[test]
    fn test_oversized_unbreakable_block_is_force_placed() {
        let mut doc = make_document(Template::Modern, &["myTime"], &[]);
        doc.set_section("myTime", json!([{ "label": "Work", "value": 60 }]));
        let engine = make_engine(&[("myTime", budget() * 1.5)], 0.0);

        let layout = engine.compute(&doc);

        assert_eq!(layout.page_count(), 1);
        assert_eq!(two_column(&layout)[0].left["myTime"], vec![0]);
        assert_eq!(layout.plan.overflowed_pages(), vec![0]);
    }

    #[test]
    fn test_two_column_balance_columns_fill_independently() {
        let mut doc = make_document(Template::Modern, &["experience"], &["projects"]);
        doc.set_section("experience", jobs(1));
        doc.set_section("projects", jobs(12));
        let b = budget();
        let engine = make_engine(&[("experience-0", b * 0.9)], b * 0.1);

        let layout = engine.compute(&doc);

        let pages = two_column(&layout);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].left["experience"], vec![0]);
        // title + 8 entries with gaps stay under budget, a ninth does not
        assert_eq!(pages[0].right["projects"], (0..8).collect::<Vec<_>>());
        assert!(pages[1].left.is_empty());
        assert_eq!(pages[1].right["projects"], vec![8, 9, 10, 11]);
    }

    #[test]
    fn test_single_column_template_uses_one_column() {
        let mut doc = make_document(Template::Ats, &["experience"], &["skills"]);
        doc.set_section("experience", jobs(2));
        doc.set_section("skills", json!(["Rust"]));
        let layout = make_engine(&[], 50.0).compute(&doc);

        match &layout.plan {
            PagePlan::SingleColumn(pages) => {
                let keys: Vec<&str> = pages[0].items.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["experience", "skills"]);
            }
            PagePlan::TwoColumn(_) => panic!("expected a single-column plan"),
        }
        assert_eq!(layout.pages[0].columns.len(), 1);
    }

    #[test]
    fn test_header_reduces_first_page_budget_only() {
        let mut doc = make_document(Template::Modern, &["summary"], &[]);
        doc.set_section("personalInfo", json!({ "name": "Ada" }));
        doc.set_section("summary", json!("Hi"));
        let layout = make_engine(&[("header", 120.0)], 10.0).compute(&doc);

        assert_eq!(layout.measurements.header_height, 120.0);
        assert!((layout.params.page_height - layout.params.first_page_height - 120.0).abs() < 1e-3);
        assert!(layout.pages[0].header.is_some());
    }

    #[test]
    fn test_request_corrections_override_template_defaults() {
        let mut doc = make_document(Template::Modern, &["skills"], &[]);
        doc.set_section("skills", json!(["Rust"]));
        let engine = make_engine(&[("skills-0", 100.0)], 0.0);

        let default = engine.compute(&doc);
        assert!((default.measurements.heights.get("skills-0") - 90.0).abs() < 1e-3);

        let extra = CorrectionFactors::parse("skills=0.5").unwrap();
        let corrected = engine.compute_with_corrections(&doc, &extra);
        assert!((corrected.measurements.heights.get("skills-0") - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let mut doc = make_document(Template::Modern, &["experience"], &["skills"]);
        doc.set_section("experience", jobs(6));
        doc.set_section("skills", json!(["Rust", "SQL"]));
        let engine = LayoutEngine::new(PageFormat::Letter, CorrectionFactors::default());

        assert_eq!(engine.compute(&doc), engine.compute(&doc));
    }

    #[tokio::test]
    async fn test_compute_blocking_matches_compute() {
        let mut doc = make_document(Template::Ats, &["summary"], &[]);
        doc.set_section("summary", json!("Writes layout engines."));
        let engine = make_engine(&[], 25.0);

        let off_thread = engine
            .compute_blocking(doc.clone(), CorrectionFactors::default())
            .await
            .unwrap();

        assert_eq!(off_thread, engine.compute(&doc));
    }

    #[tokio::test]
    async fn test_scheduler_run_commits_layout() {
        let scheduler = LayoutScheduler::new(make_engine(&[], 20.0));
        assert!(scheduler.latest().is_none());

        let mut doc = make_document(Template::Modern, &["summary"], &[]);
        doc.set_section("summary", json!("Hello"));
        let snapshot = scheduler.run(1, doc.clone()).await.unwrap();

        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.document, doc);
        assert_eq!(snapshot.layout.page_count(), 1);
        assert_eq!(scheduler.latest().map(|s| s.revision), Some(1));
        assert_eq!(scheduler.latest().as_deref(), Some(snapshot.as_ref()));
    }

    #[tokio::test]
    async fn test_newer_schedule_supersedes_pending_pass() {
        let scheduler = LayoutScheduler::new(make_engine(&[], 20.0));
        let mut stale = make_document(Template::Modern, &["summary"], &[]);
        stale.set_section("summary", json!("Old"));
        let mut fresh = make_document(Template::Modern, &["skills"], &[]);
        fresh.set_section("skills", json!(["Rust"]));

        assert!(scheduler.schedule(1, stale));
        let snapshot = scheduler.run(2, fresh).await.unwrap();

        assert_eq!(scheduler.latest().map(|s| s.revision), Some(2));
        assert!(two_column(&snapshot.layout)[0].left.contains_key("skills"));
        assert!(!two_column(&snapshot.layout)[0].left.contains_key("summary"));
    }

    #[tokio::test]
    async fn test_older_revision_scheduled_late_never_commits() {
        let scheduler = LayoutScheduler::new(make_engine(&[], 20.0));
        let mut older = make_document(Template::Modern, &["summary"], &[]);
        older.set_section("summary", json!("Old"));
        let mut newer = make_document(Template::Modern, &["summary"], &["skills"]);
        newer.set_section("summary", json!("New"));
        newer.set_section("skills", json!(["Rust"]));

        // The newer edit's pass is requested first.
        let first = scheduler.run(2, newer.clone()).await.unwrap();
        assert!(!scheduler.schedule(1, older.clone()));
        let second = scheduler.run(1, older).await.unwrap();

        assert_eq!(first.revision, 2);
        assert_eq!(second.revision, 2);
        assert_eq!(second.document, newer);
        let latest = scheduler.latest().unwrap();
        assert_eq!(latest.document, newer);
        assert!(two_column(&latest.layout)[0].right.contains_key("skills"));
    }

    #[tokio::test]
    async fn test_stale_commit_never_replaces_newer_layout() {
        let engine = make_engine(&[], 20.0);
        let scheduler = LayoutScheduler::new(engine.clone());
        let mut old = make_document(Template::Modern, &["summary"], &[]);
        old.set_section("summary", json!("Old"));
        let mut new = make_document(Template::Ats, &["summary"], &[]);
        new.set_section("summary", json!("New"));

        scheduler.inner.requested.store(2, Ordering::SeqCst);
        let snapshot = |revision, document: &ResumeDocument| LayoutSnapshot {
            revision,
            document: document.clone(),
            layout: engine.compute(document),
        };
        assert!(scheduler.inner.commit(snapshot(2, &new)));
        assert!(!scheduler.inner.commit(snapshot(1, &old)));

        let latest = scheduler.latest().unwrap();
        assert_eq!(latest.layout.template, Template::Ats);
    }

    /// Tags summary fragments and records how often it ran in measuring mode.
    #[derive(Default)]
    struct TaggingRenderer {
        measuring_calls: std::sync::atomic::AtomicUsize,
    }

    impl SectionRenderer for TaggingRenderer {
        fn render(&self, data: &Value, options: &RenderOptions<'_>) -> Vec<Fragment> {
            if options.is_measuring {
                self.measuring_calls.fetch_add(1, Ordering::SeqCst);
            }
            vec![Fragment {
                index: None,
                data: json!(format!("tagged: {}", data.as_str().unwrap_or_default())),
                editable: false,
            }]
        }
    }

    #[test]
    fn test_registered_renderer_reaches_measurement_and_pages() {
        let tagging = Arc::new(TaggingRenderer::default());
        let mut registry = RendererRegistry::default();
        registry.register("summary", tagging.clone());
        let engine = LayoutEngine::new(PageFormat::A4, CorrectionFactors::default())
            .with_registry(registry);
        let mut doc = make_document(Template::Modern, &["summary"], &[]);
        doc.set_section("summary", json!("Hello"));

        let layout = engine.compute(&doc);

        assert_eq!(tagging.measuring_calls.load(Ordering::SeqCst), 1);
        let section = &layout.pages[0].columns[0].sections[0];
        assert_eq!(section.key, "summary");
        assert_eq!(section.fragments[0].data, json!("tagged: Hello"));

        let editing = engine.render_editing(&doc);
        assert_eq!(editing.len(), 1);
        assert_eq!(editing[0].fragments[0].data, json!("tagged: Hello"));
    }
}
