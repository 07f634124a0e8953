//! Axum route handlers for stateless layout requests.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::layout::debug::{render_debug_svg, DEFAULT_SCALE};
use crate::layout::{CorrectionFactors, Layout};
use crate::models::ResumeDocument;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    pub document: ResumeDocument,
    /// Per-request overrides of the height correction factors.
    #[serde(default)]
    pub corrections: CorrectionFactors,
}

#[derive(Debug, Deserialize)]
pub struct DebugQuery {
    pub scale: Option<f32>,
}

async fn compute(state: &AppState, request: LayoutRequest) -> Result<(ResumeDocument, Layout), AppError> {
    request.document.design.validate().map_err(AppError::Validation)?;
    let layout = state
        .engine
        .compute_blocking(request.document.clone(), request.corrections)
        .await?;
    Ok((request.document, layout))
}

/// POST /api/v1/layout
///
/// Paginates a document with the algorithm of its template.
pub async fn handle_layout(
    State(state): State<AppState>,
    Json(request): Json<LayoutRequest>,
) -> Result<Json<Layout>, AppError> {
    let (_, layout) = compute(&state, request).await?;
    Ok(Json(layout))
}

/// POST /api/v1/layout/debug?scale=0.5
///
/// Same computation, drawn as an SVG diagram of pages and entry boxes.
pub async fn handle_layout_debug(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
    Json(request): Json<LayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (document, layout) = compute(&state, request).await?;
    let svg = render_debug_svg(&document, &layout, query.scale.unwrap_or(DEFAULT_SCALE));
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}
