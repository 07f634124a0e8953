use crate::config::Config;
use crate::drafts::DraftRegistry;
use crate::layout::LayoutEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Stateless pipeline for one-off layout requests.
    pub engine: LayoutEngine,
    /// Open drafts; each carries its own layout scheduler.
    pub drafts: DraftRegistry,
}
