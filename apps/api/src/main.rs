mod config;
mod db;
mod drafts;
mod errors;
mod layout;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::drafts::{DraftRegistry, DraftStore, MemoryDraftStore, PgDraftStore};
use crate::layout::LayoutEngine;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Pagewright API v{}", env!("CARGO_PKG_VERSION"));

    // Draft store: PostgreSQL when configured, memory otherwise
    let store: Arc<dyn DraftStore> = match &config.database_url {
        Some(url) => Arc::new(PgDraftStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set, drafts are kept in memory only");
            Arc::new(MemoryDraftStore::default())
        }
    };

    // Layout engine shared by stateless requests and draft schedulers
    let engine = LayoutEngine::new(config.page_format, config.height_corrections.clone());
    info!(
        "Layout engine: {:?} pages, persistence debounce {}ms",
        config.page_format,
        config.persist_debounce.as_millis()
    );

    let drafts = DraftRegistry::new(
        store,
        engine.clone(),
        config.persist_debounce,
        config.draft_idle_ttl,
    );
    // Sweep a few times per TTL so idle drafts do not linger much past it.
    let eviction = drafts.spawn_eviction((config.draft_idle_ttl / 4).max(Duration::from_secs(1)));

    // Build app state
    let state = AppState {
        config: config.clone(),
        engine,
        drafts: drafts.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the editor front end

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist debounced edits still pending
    eviction.abort();
    info!("Flushing open drafts");
    drafts.flush_all().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
