//! Import: compressed file set to store
//!
//! 1. **expand_pattern**: resolves the input glob to a sorted file list
//! 2. **BatchUpsertWriter**: buffers upserts and sends them in bulk
//! 3. **ImportPipeline**: reads each file and drives the batches

pub mod batch;
pub mod files;
pub mod pipeline;

pub use batch::{BatchUpsertWriter, FlushReport};
pub use files::expand_pattern;
pub use pipeline::{ImportPipeline, ImportSummary};
