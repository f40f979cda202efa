//! Size-bounded batches of upserts

use tracing::{debug, warn};

use crate::error::Result;
use crate::record::Record;
use crate::store::{DocumentStore, UpsertOp};

/// Estimated bytes of bulk framing per operation (action line, field
/// names, separators)
pub const OPERATION_OVERHEAD: usize = 64;

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Operations sent
    pub attempted: usize,
    /// Operations the store applied
    pub succeeded: usize,
    /// Operations the store rejected
    pub failed: usize,
}

/// Buffers upserts for one index and sends them in bulk.
///
/// The size estimate is approximate; a single flush can exceed the
/// threshold by up to one record.
pub struct BatchUpsertWriter {
    index: String,
    threshold: usize,
    ops: Vec<UpsertOp>,
    estimated: usize,
}

impl BatchUpsertWriter {
    /// Create an empty batch
    ///
    /// # Arguments
    /// * `index` - Target index (or collection)
    /// * `threshold` - Estimated size in bytes above which the batch should be flushed
    pub fn new(index: impl Into<String>, threshold: usize) -> Self {
        Self {
            index: index.into(),
            threshold,
            ops: Vec::new(),
            estimated: 0,
        }
    }

    /// Buffer an upsert of `record`
    pub fn add(&mut self, record: Record) {
        self.estimated += self.estimate(&record);
        self.ops.push(record.into());
    }

    /// Number of buffered operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Running size estimate of the pending bulk request
    pub fn estimated_size(&self) -> usize {
        self.estimated
    }

    /// Whether the estimate is over the threshold
    pub fn should_flush(&self) -> bool {
        self.estimated > self.threshold
    }

    /// Send every buffered operation in one bulk call
    ///
    /// The buffer is empty afterwards whatever the outcome. Records the
    /// store rejects are logged and counted; a failure of the call itself
    /// is returned.
    ///
    /// # Arguments
    /// * `store` - Store to write to
    ///
    /// # Returns
    /// * `Result<FlushReport>` - Per-operation counts or transport error
    pub async fn flush(&mut self, store: &dyn DocumentStore) -> Result<FlushReport> {
        let ops = std::mem::take(&mut self.ops);
        let estimated = std::mem::take(&mut self.estimated);
        if ops.is_empty() {
            return Ok(FlushReport::default());
        }

        debug!(
            "Flushing {} upserts (~{} bytes) to {}",
            ops.len(),
            estimated,
            self.index
        );
        let response = store.bulk_upsert(&self.index, &ops).await?;

        let mut failed = 0;
        if response.errors {
            for item in response.failed() {
                failed += 1;
                warn!(
                    "Error upserting {}: {}",
                    item.id,
                    item.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Ok(FlushReport {
            attempted: ops.len(),
            succeeded: ops.len().saturating_sub(failed),
            failed,
        })
    }

    fn estimate(&self, record: &Record) -> usize {
        record.id.len()
            + record.doc_type.len()
            + self.index.len()
            + record.source_json().map_or(4, str::len)
            + OPERATION_OVERHEAD
    }
}
