use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::resume::ResumeDocument;

/// Persisted half of a draft. Exactly one of `owner_id` / `guest_token` is set.
#[derive(Debug, Clone, FromRow)]
pub struct DraftRow {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub guest_token: Option<String>,
    pub document: Json<ResumeDocument>,
    pub updated_at: DateTime<Utc>,
}
