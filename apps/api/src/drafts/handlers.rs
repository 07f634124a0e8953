//! Axum route handlers for the Drafts API.
//!
//! Every edit updates the live document and answers with a freshly computed
//! layout, paired with the document revision it was computed from. A request
//! overtaken by a newer edit answers with the newer revision. Persistence
//! happens later, once edits settle.


use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::drafts::Session;
use crate::drafts::draft::DraftSession;
use crate::errors::AppError;
use crate::layout::renderer::RenderedSection;
use crate::layout::{Layout, LayoutEngine, LayoutSnapshot};
use crate::models::resume::is_section_key;
use crate::models::{DesignConfig, ResumeDocument};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateDraftRequest {
    #[serde(default)]
    pub document: ResumeDocument,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    pub id: Uuid,
    /// Edit revision of `document`; `layout` and `editing` belong to it.
    pub revision: u64,
    pub document: ResumeDocument,
    /// False while live edits are waiting to be persisted.
    pub persisted: bool,
    pub updated_at: DateTime<Utc>,
    pub layout: Layout,
    /// Unpaginated sections for the live editor.
    pub editing: Vec<RenderedSection>,
}

fn respond(
    engine: &LayoutEngine,
    draft: &DraftSession,
    snapshot: &LayoutSnapshot,
) -> Json<DraftResponse> {
    Json(DraftResponse {
        id: draft.id(),
        revision: snapshot.revision,
        document: snapshot.document.clone(),
        persisted: !draft.is_dirty(),
        updated_at: draft.updated_at(),
        layout: snapshot.layout.clone(),
        editing: engine.render_editing(&snapshot.document),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/drafts
pub async fn handle_create_draft(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<DraftResponse>), AppError> {
    let owner = session.require_owner()?;
    request.document.design.validate().map_err(AppError::Validation)?;

    let draft = state.drafts.create(owner, request.document).await?;
    let snapshot = draft.current_layout().await?;
    Ok((StatusCode::CREATED, respond(&state.engine, &draft, &snapshot)))
}

/// GET /api/v1/drafts/:id
pub async fn handle_get_draft(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DraftResponse>, AppError> {
    let draft = state.drafts.open(id, &session).await?;
    let snapshot = draft.current_layout().await?;
    Ok(respond(&state.engine, &draft, &snapshot))
}

/// PUT /api/v1/drafts/:id/sections/:key
///
/// Replaces one section's whole value, as emitted by its editor.
pub async fn handle_put_section(
    State(state): State<AppState>,
    session: Session,
    Path((id, key)): Path<(Uuid, String)>,
    Json(value): Json<Value>,
) -> Result<Json<DraftResponse>, AppError> {
    if !is_section_key(&key) {
        return Err(AppError::Validation(format!("'{key}' is not a section key")));
    }
    let draft = state.drafts.open(id, &session).await?;
    let revision = draft.edit(|doc| doc.set_section(&key, value));
    let snapshot = draft.layout(revision).await?;
    Ok(respond(&state.engine, &draft, &snapshot))
}

/// PUT /api/v1/drafts/:id/design
pub async fn handle_put_design(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(design): Json<DesignConfig>,
) -> Result<Json<DraftResponse>, AppError> {
    design.validate().map_err(AppError::Validation)?;
    let draft = state.drafts.open(id, &session).await?;
    let revision = draft.edit(|doc| doc.design = design);
    let snapshot = draft.layout(revision).await?;
    Ok(respond(&state.engine, &draft, &snapshot))
}

/// PUT /api/v1/drafts/:id/visibility/:key
pub async fn handle_put_visibility(
    State(state): State<AppState>,
    session: Session,
    Path((id, key)): Path<(Uuid, String)>,
    Json(request): Json<VisibilityRequest>,
) -> Result<Json<DraftResponse>, AppError> {
    if !is_section_key(&key) {
        return Err(AppError::Validation(format!("'{key}' is not a section key")));
    }
    let draft = state.drafts.open(id, &session).await?;
    let revision = draft.edit(|doc| doc.set_visibility(&key, request.visible));
    let snapshot = draft.layout(revision).await?;
    Ok(respond(&state.engine, &draft, &snapshot))
}

/// GET /api/v1/drafts/:id/layout
///
/// Returns the layout of the live document, reusing the last committed pass
/// when it is current.
pub async fn handle_get_draft_layout(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Layout>, AppError> {
    let draft = state.drafts.open(id, &session).await?;
    let snapshot = draft.current_layout().await?;
    Ok(Json(snapshot.layout.clone()))
}
