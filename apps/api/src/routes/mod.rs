pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::drafts::handlers as drafts;
use crate::layout::handlers as layout;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Stateless layout
        .route("/api/v1/layout", post(layout::handle_layout))
        .route("/api/v1/layout/debug", post(layout::handle_layout_debug))
        // Drafts
        .route("/api/v1/drafts", post(drafts::handle_create_draft))
        .route("/api/v1/drafts/:id", get(drafts::handle_get_draft))
        .route(
            "/api/v1/drafts/:id/sections/:key",
            put(drafts::handle_put_section),
        )
        .route("/api/v1/drafts/:id/design", put(drafts::handle_put_design))
        .route(
            "/api/v1/drafts/:id/visibility/:key",
            put(drafts::handle_put_visibility),
        )
        .route(
            "/api/v1/drafts/:id/layout",
            get(drafts::handle_get_draft_layout),
        )
        .with_state(state)
}
