//! Export: store to compressed file set
//!
//! The export side is built on three components:
//!
//! 1. **ScrollReader**: pulls pages from a store scroll cursor
//! 2. **CompressedFileRotator**: writes lines into rotating gzip files
//! 3. **ProgressTracker**: reports running totals (see [`crate::progress`])
//!
//! These are orchestrated by the **ExportPipeline**.

pub mod pipeline;
pub mod rotator;
pub mod scroll;

pub use pipeline::{ExportOptions, ExportPipeline, ExportSummary};
pub use rotator::{CompressedFileRotator, validate_prefix};
pub use scroll::ScrollReader;
