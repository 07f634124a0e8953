// Pagination engine: measurement buffer, greedy packing, page rendering.
// Each pass is a pure function of the document and the measured heights.
// CPU-bound passes must run inside tokio::task::spawn_blocking.

pub mod debug;
pub mod engine;
pub mod entries;
pub mod font_metrics;
pub mod geometry;
pub mod handlers;
pub mod measure;
pub mod packing;
pub mod renderer;

// Re-export the public API consumed by other modules (drafts, handlers).
pub use engine::{Layout, LayoutEngine, LayoutScheduler, LayoutSnapshot};
pub use geometry::PageFormat;
pub use measure::CorrectionFactors;
