use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafts::auth::{Owner, Session};
use crate::drafts::draft::DraftSession;
use crate::drafts::store::{DraftStore, StoredDraft};
use crate::errors::AppError;
use crate::layout::{LayoutEngine, LayoutScheduler};
use crate::models::ResumeDocument;

/// Drafts currently open for editing, keyed by id. Drafts not in memory are
/// loaded from the store on first access; drafts left idle are flushed and
/// dropped again by `evict_idle`.
#[derive(Clone)]
pub struct DraftRegistry {
    open: Arc<RwLock<HashMap<Uuid, Arc<DraftSession>>>>,
    store: Arc<dyn DraftStore>,
    engine: LayoutEngine,
    debounce: Duration,
    idle_ttl: Duration,
}

impl DraftRegistry {
    pub fn new(
        store: Arc<dyn DraftStore>,
        engine: LayoutEngine,
        debounce: Duration,
        idle_ttl: Duration,
    ) -> Self {
        DraftRegistry {
            open: Arc::new(RwLock::new(HashMap::new())),
            store,
            engine,
            debounce,
            idle_ttl,
        }
    }

    fn session_for(&self, stored: StoredDraft) -> Arc<DraftSession> {
        Arc::new(DraftSession::new(
            stored,
            Arc::clone(&self.store),
            self.debounce,
            LayoutScheduler::new(self.engine.clone()),
        ))
    }

    /// Creates and immediately persists a new draft.
    pub async fn create(
        &self,
        owner: Owner,
        document: ResumeDocument,
    ) -> Result<Arc<DraftSession>, AppError> {
        let stored = StoredDraft {
            id: Uuid::new_v4(),
            owner,
            document,
            updated_at: Utc::now(),
        };
        self.store.save(&stored).await?;

        let draft = self.session_for(stored);
        self.open.write().await.insert(draft.id(), Arc::clone(&draft));
        info!(draft = %draft.id(), "Draft created");
        Ok(draft)
    }

    /// Returns the open draft `id` if `session` owns it.
    pub async fn open(&self, id: Uuid, session: &Session) -> Result<Arc<DraftSession>, AppError> {
        // Touched under the read lock so eviction never drops a draft in use.
        let cached = self.open.read().await.get(&id).map(|draft| {
            draft.touch();
            Arc::clone(draft)
        });
        let draft = match cached {
            Some(draft) => draft,
            None => {
                let stored = self
                    .store
                    .load(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Draft {id} not found")))?;
                let loaded = self.session_for(stored);
                // Another request may have opened it while we were loading.
                Arc::clone(self.open.write().await.entry(id).or_insert(loaded))
            }
        };
        session.authorize(draft.owner())?;
        Ok(draft)
    }

    #[cfg(test)]
    pub async fn open_count(&self) -> usize {
        self.open.read().await.len()
    }

    /// Flushes and drops drafts idle for at least the configured TTL.
    /// A draft whose flush fails stays open. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let idle: Vec<Arc<DraftSession>> = self
            .open
            .read()
            .await
            .values()
            .filter(|draft| draft.idle_for() >= self.idle_ttl)
            .cloned()
            .collect();

        let mut evicted = 0;
        for draft in idle {
            if let Err(e) = draft.flush().await {
                warn!(draft = %draft.id(), "Flushing idle draft failed, keeping it open: {e}");
                continue;
            }
            let mut open = self.open.write().await;
            // Reopened or edited while flushing.
            if draft.is_dirty() || draft.idle_for() < self.idle_ttl {
                continue;
            }
            if open.remove(&draft.id()).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Evicted idle drafts");
        }
        evicted
    }

    /// Runs `evict_idle` every `period` for the life of the process.
    pub fn spawn_eviction(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.evict_idle().await;
            }
        })
    }

    /// Persists every dirty draft now. Used on shutdown.
    pub async fn flush_all(&self) {
        let drafts: Vec<Arc<DraftSession>> = self.open.read().await.values().cloned().collect();
        for draft in drafts {
            if let Err(e) = draft.flush().await {
                warn!(draft = %draft.id(), "Flushing draft failed: {e}");
            }
        }
    }
}
