//! Import pipeline
//!
//! Reads gzip-compressed dump files in order, decodes one record per line
//! and upserts the records into a store in size-bounded batches.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::read::MultiGzDecoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::RecordLines;
use crate::error::{DumpError, Result};
use crate::progress::ProgressTracker;
use crate::store::DocumentStore;

use super::batch::{BatchUpsertWriter, FlushReport};

/// Read buffer behind the decompressor
const BUFFER_SIZE: usize = 1024 * 1024;

/// Result of an import run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Files fully or partly read
    pub files: usize,
    /// Records decoded and sent
    pub records: u64,
    /// Records the store applied
    pub upserted: u64,
    /// Records the store rejected
    pub failed: u64,
    /// Lines skipped because they did not decode
    pub skipped_lines: u64,
    /// Time taken
    pub elapsed: Duration,
    /// Whether the run stopped early on request
    pub cancelled: bool,
}

impl ImportSummary {
    fn new() -> Self {
        Self {
            files: 0,
            records: 0,
            upserted: 0,
            failed: 0,
            skipped_lines: 0,
            elapsed: Duration::ZERO,
            cancelled: false,
        }
    }

    fn absorb(&mut self, report: FlushReport) {
        self.upserted += report.succeeded as u64;
        self.failed += report.failed as u64;
    }
}

/// Runs one import of a file list into a store index.
pub struct ImportPipeline {
    store: Arc<dyn DocumentStore>,
    index: String,
    files: Vec<PathBuf>,
    flush_threshold: usize,
    tracker: ProgressTracker,
    cancel_token: Option<CancellationToken>,
}

impl ImportPipeline {
    /// Create a new import pipeline
    ///
    /// # Arguments
    /// * `store` - Store to write to
    /// * `index` - Target index (or collection)
    /// * `files` - Input files, in processing order
    /// * `flush_threshold` - Estimated batch size that triggers a flush
    /// * `tracker` - Progress reporting
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: impl Into<String>,
        files: Vec<PathBuf>,
        flush_threshold: usize,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            store,
            index: index.into(),
            files,
            flush_threshold,
            tracker,
            cancel_token: None,
        }
    }

    /// Set cancellation token for this import
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Execute the import
    ///
    /// # Returns
    /// * `Result<ImportSummary>` - Import statistics or error
    pub async fn execute(&mut self) -> Result<ImportSummary> {
        let start_time = Instant::now();
        let mut summary = ImportSummary::new();

        info!("Importing from {} file(s)", self.files.len());

        let files = std::mem::take(&mut self.files);
        let outcome = self.import_files(&files, &mut summary).await;
        self.files = files;
        self.tracker.finish();
        outcome?;

        summary.elapsed = start_time.elapsed();
        info!(
            "Import {}: {} records from {} files ({} upserted, {} failed, {} lines skipped)",
            if summary.cancelled { "cancelled" } else { "completed" },
            summary.records,
            summary.files,
            summary.upserted,
            summary.failed,
            summary.skipped_lines
        );
        Ok(summary)
    }

    async fn import_files(&mut self, files: &[PathBuf], summary: &mut ImportSummary) -> Result<()> {
        for path in files {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.files += 1;
            let records = self.import_file(path, summary).await?;
            info!("Records in {:?}: {}", path.display().to_string(), records);
            if summary.cancelled {
                break;
            }
        }
        if summary.cancelled {
            info!("Import cancelled by user");
        }
        Ok(())
    }

    /// Import one file with a fresh batch; returns its record count.
    async fn import_file(&mut self, path: &Path, summary: &mut ImportSummary) -> Result<u64> {
        let file = File::open(path).map_err(|e| DumpError::file("opening", path, e))?;
        let reader = BufReader::with_capacity(BUFFER_SIZE, MultiGzDecoder::new(file));
        let mut lines = RecordLines::new(reader);
        let mut batch = BatchUpsertWriter::new(self.index.clone(), self.flush_threshold);
        let mut records = 0u64;

        debug!("Reading {}", path.display());

        loop {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let decoded = match lines.next() {
                Some(Ok(decoded)) => decoded,
                Some(Err(e)) => {
                    // Keep what was read before the stream broke
                    if let Err(flush_err) = self.flush(&mut batch, summary).await {
                        warn!("Error flushing pending records: {}", flush_err);
                    }
                    return Err(DumpError::file("reading", path, e));
                }
                None => break,
            };

            match decoded.record {
                Ok(record) => {
                    records += 1;
                    summary.records += 1;
                    batch.add(record);
                    if batch.should_flush() {
                        self.flush(&mut batch, summary).await?;
                        info!("Records inserted: {}", summary.upserted);
                    }
                }
                Err(e) => {
                    summary.skipped_lines += 1;
                    warn!(
                        "Skipping line {} of {:?}: {}",
                        decoded.line,
                        path.display().to_string(),
                        e
                    );
                }
            }
        }

        self.flush(&mut batch, summary).await?;
        Ok(records)
    }

    async fn flush(&self, batch: &mut BatchUpsertWriter, summary: &mut ImportSummary) -> Result<()> {
        let report = batch.flush(self.store.as_ref()).await?;
        if report.attempted > 0 {
            summary.absorb(report);
            self.tracker.update(summary.records);
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
