//! docdump library
//!
//! Bulk export of a document store index to rotating, gzip-compressed
//! JSON line files, and bulk import of such files back into a store.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `codec`: One-record-per-line encoding
//! - `config`: Configuration management
//! - `connection`: Backend selection and store connection
//! - `error`: Error types and handling
//! - `export`: Scroll reader, file rotator and export pipeline
//! - `import`: File discovery, batch writer and import pipeline
//! - `progress`: Progress reporting
//! - `record`: The record moved between stores and files
//! - `store`: Store clients (Elasticsearch, MongoDB)
//!
//! # Example
//!
//! ```no_run
//! use docdump::config::Config;
//! use docdump::connection::ConnectionManager;
//! use docdump::import::{ImportPipeline, expand_pattern};
//! use docdump::progress::ProgressTracker;
//!
//! #[tokio::main]
//! async fn main() -> docdump::Result<()> {
//!     let config = Config::default();
//!     let files = expand_pattern("dump.*.json.gz")?;
//!     let manager = ConnectionManager::new("http://localhost:9200", config.connection)?;
//!     let store = manager.connect().await?;
//!
//!     let summary = ImportPipeline::new(
//!         store,
//!         "tweets",
//!         files,
//!         config.transfer.flush_threshold_bytes,
//!         ProgressTracker::new(None, false),
//!     )
//!     .execute()
//!     .await?;
//!     println!("{} records processed", summary.records);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod import;
pub mod progress;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{DumpError, Result};
pub use export::{ExportPipeline, ExportSummary};
pub use import::{ImportPipeline, ImportSummary};
pub use record::Record;
pub use store::DocumentStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
