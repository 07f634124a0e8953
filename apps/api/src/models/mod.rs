pub mod draft;
pub mod resume;

pub use draft::DraftRow;
pub use resume::{Column, ColumnLayout, DesignConfig, ResumeDocument, Template};
