// Drafts: explicit sessions, dual-state (live / persisted) documents,
// debounced persistence to a DraftStore.

pub mod auth;
pub mod draft;
pub mod handlers;
pub mod registry;
pub mod store;

pub use auth::Session;
pub use registry::DraftRegistry;
pub use store::{DraftStore, MemoryDraftStore, PgDraftStore};
