//! Backing stores for the persisted half of drafts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::drafts::auth::Owner;
use crate::errors::AppError;
use crate::models::{DraftRow, ResumeDocument};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDraft {
    pub id: Uuid,
    pub owner: Owner,
    pub document: ResumeDocument,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DraftRow> for StoredDraft {
    type Error = AppError;

    fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
        let owner = match (row.owner_id, row.guest_token) {
            (Some(id), _) => Owner::User(id),
            (None, Some(token)) => Owner::Guest(token),
            (None, None) => {
                return Err(AppError::Internal(anyhow!("Draft {} has no owner", row.id)));
            }
        };
        Ok(StoredDraft {
            id: row.id,
            owner,
            document: row.document.0,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<StoredDraft>, AppError>;

    /// Inserts or replaces the draft's document.
    async fn save(&self, draft: &StoredDraft) -> Result<(), AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

pub struct PgDraftStore {
    pool: PgPool,
}

impl PgDraftStore {
    pub fn new(pool: PgPool) -> Self {
        PgDraftStore { pool }
    }
}

#[async_trait]
impl DraftStore for PgDraftStore {
    async fn load(&self, id: Uuid) -> Result<Option<StoredDraft>, AppError> {
        let row = sqlx::query_as::<_, DraftRow>(
            "SELECT id, owner_id, guest_token, document, updated_at FROM resume_drafts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredDraft::try_from).transpose()
    }

    async fn save(&self, draft: &StoredDraft) -> Result<(), AppError> {
        let (owner_id, guest_token) = match &draft.owner {
            Owner::User(id) => (Some(*id), None),
            Owner::Guest(token) => (None, Some(token.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO resume_drafts (id, owner_id, guest_token, document, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET document = EXCLUDED.document,
                    updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(draft.id)
        .bind(owner_id)
        .bind(guest_token)
        .bind(Json(&draft.document))
        .bind(draft.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Used when no `DATABASE_URL` is configured, and in tests.
#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: RwLock<HashMap<Uuid, StoredDraft>>,
    writes: AtomicUsize,
}

impl MemoryDraftStore {
    /// Number of successful `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn load(&self, id: Uuid) -> Result<Option<StoredDraft>, AppError> {
        Ok(self.drafts.read().await.get(&id).cloned())
    }

    async fn save(&self, draft: &StoredDraft) -> Result<(), AppError> {
        self.drafts.write().await.insert(draft.id, draft.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
