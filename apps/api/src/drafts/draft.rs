//! A draft open for editing, held as two explicit states.
//!
//! - `live` is what the editor sees and what layout runs against. Every edit
//!   mutates it immediately.
//! - `persisted` mirrors the store. It only changes by copying `live` over
//!   once edits have settled (trailing-edge debounce) or on `flush`.
//!
//! Debouncing applies to persistence only. Every edit schedules a layout pass
//! for its revision while the draft is still locked, so passes are ordered by
//! edit order and the committed layout always belongs to the newest edit.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafts::auth::Owner;
use crate::drafts::store::{DraftStore, StoredDraft};
use crate::errors::AppError;
use crate::layout::{LayoutScheduler, LayoutSnapshot};
use crate::models::ResumeDocument;

#[derive(Debug, Clone)]
struct DraftState {
    live: ResumeDocument,
    persisted: ResumeDocument,
    /// Bumped by every edit.
    revision: u64,
    /// Revision `persisted` was copied from.
    persisted_revision: u64,
    updated_at: DateTime<Utc>,
}

pub struct DraftSession {
    id: Uuid,
    owner: Owner,
    state: Mutex<DraftState>,
    last_access: Mutex<Instant>,
    pending_persist: Mutex<Option<JoinHandle<()>>>,
    /// Serialises store writes so a slow older write never lands last.
    write_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn DraftStore>,
    debounce: Duration,
    scheduler: LayoutScheduler,
}

impl DraftSession {
    /// Opens a draft whose `document` already matches the store.
    pub fn new(
        stored: StoredDraft,
        store: Arc<dyn DraftStore>,
        debounce: Duration,
        scheduler: LayoutScheduler,
    ) -> Self {
        DraftSession {
            id: stored.id,
            owner: stored.owner,
            state: Mutex::new(DraftState {
                live: stored.document.clone(),
                persisted: stored.document,
                revision: 0,
                persisted_revision: 0,
                updated_at: stored.updated_at,
            }),
            last_access: Mutex::new(Instant::now()),
            pending_persist: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            store,
            debounce,
            scheduler,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    fn state(&self) -> MutexGuard<'_, DraftState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub fn live(&self) -> ResumeDocument {
        self.state().live.clone()
    }

    #[cfg(test)]
    pub fn persisted(&self) -> ResumeDocument {
        self.state().persisted.clone()
    }

    /// True while `live` holds edits not yet copied into `persisted`.
    pub fn is_dirty(&self) -> bool {
        let state = self.state();
        state.revision != state.persisted_revision
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state().updated_at
    }

    /// Marks the draft as in use.
    pub fn touch(&self) {
        *self
            .last_access
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    /// Time since the draft was last opened or edited.
    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }

    /// Applies `edit` to the live document, schedules a layout pass for it,
    /// restarts the persistence timer, and returns the new revision.
    pub fn edit<F>(self: &Arc<Self>, edit: F) -> u64
    where
        F: FnOnce(&mut ResumeDocument),
    {
        let revision = {
            let mut state = self.state();
            edit(&mut state.live);
            state.revision += 1;
            self.scheduler.schedule(state.revision, state.live.clone());
            state.revision
        };
        self.touch();
        self.restart_persist_timer();
        revision
    }

    /// Layout for `revision` or a newer one, with the document it was
    /// computed from.
    pub async fn layout(&self, revision: u64) -> Result<Arc<LayoutSnapshot>, AppError> {
        self.scheduler.wait(revision).await
    }

    /// Layout of the current live document, computing it if the last
    /// committed pass is older.
    pub async fn current_layout(&self) -> Result<Arc<LayoutSnapshot>, AppError> {
        let revision = {
            let state = self.state();
            match self.scheduler.latest() {
                Some(snapshot) if snapshot.revision >= state.revision => return Ok(snapshot),
                _ => self.scheduler.schedule(state.revision, state.live.clone()),
            };
            state.revision
        };
        self.layout(revision).await
    }

    fn restart_persist_timer(self: &Arc<Self>) {
        let draft = Arc::clone(self);
        let delay = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = draft.settle().await {
                warn!(draft = %draft.id, "Persisting draft failed, will retry on next edit: {e}");
            }
        });

        let mut pending = self
            .pending_persist
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    /// Copies `live` into `persisted` through the store. No-op when clean.
    pub async fn settle(&self) -> Result<(), AppError> {
        let _write = self.write_lock.lock().await;

        let (document, revision) = {
            let state = self.state();
            if state.revision == state.persisted_revision {
                return Ok(());
            }
            (state.live.clone(), state.revision)
        };

        let stored = StoredDraft {
            id: self.id,
            owner: self.owner.clone(),
            document,
            updated_at: Utc::now(),
        };
        self.store.save(&stored).await?;

        let mut state = self.state();
        if revision > state.persisted_revision {
            state.persisted = stored.document;
            state.persisted_revision = revision;
            state.updated_at = stored.updated_at;
        }
        info!(draft = %self.id, revision, "Draft persisted");
        Ok(())
    }

    /// Cancels the pending timer and persists immediately.
    pub async fn flush(&self) -> Result<(), AppError> {
        let pending = self
            .pending_persist
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = pending {
            task.abort();
        }
        self.settle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::store::MemoryDraftStore;
    use crate::layout::{CorrectionFactors, LayoutEngine, PageFormat};
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(800);

    fn make_draft() -> (Arc<DraftSession>, Arc<MemoryDraftStore>) {
        let store = Arc::new(MemoryDraftStore::default());
        let stored = StoredDraft {
            id: Uuid::new_v4(),
            owner: Owner::Guest("guest".to_string()),
            document: ResumeDocument::default(),
            updated_at: Utc::now(),
        };
        let scheduler =
            LayoutScheduler::new(LayoutEngine::new(PageFormat::A4, CorrectionFactors::default()));
        let draft = DraftSession::new(stored, store.clone(), DEBOUNCE, scheduler);
        (Arc::new(draft), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_updates_live_immediately() {
        let (draft, store) = make_draft();

        let revision = draft.edit(|doc| doc.set_section("summary", json!("Now")));

        assert_eq!(revision, 1);
        assert_eq!(draft.live().section("summary"), Some(&json!("Now")));
        assert!(draft.persisted().section("summary").is_none());
        assert!(draft.is_dirty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_within_window_coalesce_into_one_write() {
        let (draft, store) = make_draft();

        draft.edit(|doc| doc.set_section("summary", json!("a")));
        tokio::time::sleep(Duration::from_millis(500)).await;
        draft.edit(|doc| doc.set_section("summary", json!("ab")));
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The second edit restarted the timer, so nothing is written yet.
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.write_count(), 1);
        assert!(!draft.is_dirty());
        assert_eq!(draft.persisted().section("summary"), Some(&json!("ab")));
        let stored = store.load(draft.id()).await.unwrap().unwrap();
        assert_eq!(stored.document, draft.live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_persists_now_and_cancels_timer() {
        let (draft, store) = make_draft();

        draft.edit(|doc| doc.set_visibility("skills", false));
        draft.flush().await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert!(!draft.is_dirty());

        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_on_clean_draft_is_noop() {
        let (draft, store) = make_draft();
        draft.settle().await.unwrap();
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_layouts_resolved_out_of_order_keep_newest_edit() {
        let (draft, _) = make_draft();

        let older = draft.edit(|doc| doc.set_section("summary", json!("old")));
        let newer = draft.edit(|doc| {
            doc.set_section("summary", json!("new"));
            doc.set_section("skills", json!(["Rust"]));
        });

        // The newer request is answered first, then the older one.
        let newer_layout = draft.layout(newer).await.unwrap();
        let older_layout = draft.layout(older).await.unwrap();

        assert_eq!(newer_layout.revision, newer);
        assert_eq!(older_layout.revision, newer);
        assert_eq!(older_layout.document, draft.live());

        let latest = draft.scheduler.latest().unwrap();
        assert_eq!(latest.document, draft.live());
        assert_eq!(latest.document.section("skills"), Some(&json!(["Rust"])));

        let current = draft.current_layout().await.unwrap();
        assert!(Arc::ptr_eq(&current, &latest));
    }

    #[tokio::test]
    async fn test_current_layout_computes_for_unedited_draft() {
        let (draft, _) = make_draft();
        assert!(draft.scheduler.latest().is_none());

        let snapshot = draft.current_layout().await.unwrap();

        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.document, draft.live());
    }
}
