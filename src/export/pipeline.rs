//! Export pipeline
//!
//! Pulls pages from a scroll cursor, encodes every record as one line and
//! feeds the lines to a rotating set of gzip files.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::Compression;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::store::{DocumentStore, ScrollRequest};

use super::rotator::CompressedFileRotator;
use super::scroll::ScrollReader;

/// What to export and where to put it
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Index (or collection) to read
    pub index: String,
    /// Optional query filter
    pub query: Option<Box<RawValue>>,
    /// Records per scroll page
    pub page_size: u32,
    /// Scroll cursor keep-alive
    pub keep_alive: String,
    /// Output path prefix
    pub out_prefix: String,
    /// Records per file, 0 for a single file
    pub records_per_file: u64,
    /// File extension without leading dot
    pub extension: String,
    /// Gzip level (0-9)
    pub compression_level: u32,
}

/// Result of an export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of records written
    pub records: u64,
    /// Number of files produced
    pub files: usize,
    /// Uncompressed bytes written
    pub bytes: u64,
    /// Time taken
    pub elapsed: Duration,
    /// Whether the run was cancelled before the scroll was exhausted
    pub cancelled: bool,
}

/// Runs one export from a store into a file set.
pub struct ExportPipeline {
    store: Arc<dyn DocumentStore>,
    options: ExportOptions,
    tracker: ProgressTracker,
    codec: LineCodec,
    cancel_token: Option<CancellationToken>,
}

impl ExportPipeline {
    /// Create a new export pipeline
    pub fn new(
        store: Arc<dyn DocumentStore>,
        options: ExportOptions,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            store,
            options,
            tracker,
            codec: LineCodec::new(),
            cancel_token: None,
        }
    }

    /// Set cancellation token for this export
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Execute the export
    ///
    /// The output files are finalized on every exit path, including errors
    /// and cancellation.
    ///
    /// # Returns
    /// * `Result<ExportSummary>` - Export statistics or error
    pub async fn execute(&mut self) -> Result<ExportSummary> {
        let start_time = Instant::now();

        let mut rotator = CompressedFileRotator::create(
            &self.options.out_prefix,
            self.options.records_per_file,
            &self.options.extension,
            Compression::new(self.options.compression_level),
        )?;

        if let Some(ref query) = self.options.query {
            info!("Query: {}", query.get());
        }
        info!("Starting export of {}", self.options.index);

        let request = ScrollRequest {
            index: self.options.index.clone(),
            query: self.options.query.clone(),
            page_size: self.options.page_size,
            keep_alive: self.options.keep_alive.clone(),
        };
        let mut reader = match ScrollReader::open(self.store.as_ref(), &request).await {
            Ok(reader) => reader,
            Err(e) => {
                rotator.finish()?;
                return Err(e);
            }
        };

        let outcome = self.transfer(&mut reader, &mut rotator).await;

        if let Err(e) = reader.close().await {
            warn!("Error releasing scroll cursor: {}", e);
        }
        let finished = rotator.finish();
        self.tracker.finish();

        let cancelled = outcome?;
        finished?;

        let summary = ExportSummary {
            records: rotator.records(),
            files: rotator.paths().len(),
            bytes: rotator.bytes(),
            elapsed: start_time.elapsed(),
            cancelled,
        };

        info!(
            "Export {}: {} records, {} files, {} bytes, {} ms",
            if cancelled { "cancelled" } else { "completed" },
            summary.records,
            summary.files,
            summary.bytes,
            summary.elapsed.as_millis()
        );

        Ok(summary)
    }

    /// Move pages from the reader to the rotator until exhaustion or
    /// cancellation; returns whether the run was cancelled.
    async fn transfer(
        &mut self,
        reader: &mut ScrollReader,
        rotator: &mut CompressedFileRotator,
    ) -> Result<bool> {
        let mut line = Vec::with_capacity(4096);

        loop {
            if self.is_cancelled() {
                info!("Export cancelled by user");
                return Ok(true);
            }

            let Some(records) = reader.next_page().await? else {
                debug!("No more records available");
                return Ok(false);
            };

            for record in &records {
                line.clear();
                self.codec.encode_into(record, &mut line)?;
                rotator.append(&line)?;
            }

            if let Some(total) = reader.total_hits() {
                self.tracker.set_total(total);
            }
            self.tracker.update(rotator.records());
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
