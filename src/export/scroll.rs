//! Paginated reads over a store scroll cursor
//!
//! The reader turns a [`ScrollCursor`] into a finite sequence of non-empty
//! pages and owns the cursor until it is released.

use tracing::{debug, info};

use crate::error::Result;
use crate::record::Record;
use crate::store::{DocumentStore, ScrollCursor, ScrollRequest};

/// Lazy page sequence over one scroll cursor.
pub struct ScrollReader {
    cursor: Box<dyn ScrollCursor>,
    index: String,
    total_hits: Option<u64>,
    total_fetched: u64,
    pages: u32,
    exhausted: bool,
    closed: bool,
}

impl ScrollReader {
    /// Open a scroll on `store`
    ///
    /// # Arguments
    /// * `store` - Store to read from
    /// * `request` - Index, query, page size and keep-alive
    ///
    /// # Returns
    /// * `Result<Self>` - Reader positioned before the first page
    pub async fn open(store: &dyn DocumentStore, request: &ScrollRequest) -> Result<Self> {
        let cursor = store.open_scroll(request).await?;
        Ok(Self::new(cursor, request.index.clone()))
    }

    /// Wrap an already opened cursor
    pub fn new(cursor: Box<dyn ScrollCursor>, index: String) -> Self {
        Self {
            cursor,
            index,
            total_hits: None,
            total_fetched: 0,
            pages: 0,
            exhausted: false,
            closed: false,
        }
    }

    /// Pull the next page
    ///
    /// # Returns
    /// * `Result<Option<Vec<Record>>>` - Next non-empty page, or None when exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>> {
        if self.exhausted || self.closed {
            return Ok(None);
        }

        match self.cursor.next_page().await? {
            Some(page) if !page.records.is_empty() => {
                self.pages += 1;
                self.total_fetched += page.records.len() as u64;
                self.total_hits = Some(page.total_hits);
                debug!(
                    "Fetched page #{} of {} records from {} (total: {})",
                    self.pages,
                    page.records.len(),
                    self.index,
                    self.total_fetched
                );
                Ok(Some(page.records))
            }
            _ => {
                debug!(
                    "Scroll over {} exhausted after {} records",
                    self.index, self.total_fetched
                );
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Total number of matches reported by the store, once a page arrived
    pub fn total_hits(&self) -> Option<u64> {
        self.total_hits
    }

    /// Records pulled so far
    pub fn total_fetched(&self) -> u64 {
        self.total_fetched
    }

    /// Release the cursor
    ///
    /// Only the first call reaches the store.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor.close().await?;
        info!(
            "Closed scroll over {} after fetching {} records",
            self.index, self.total_fetched
        );
        Ok(())
    }
}

impl Drop for ScrollReader {
    fn drop(&mut self) {
        if !self.closed {
            debug!("ScrollReader over {} dropped without explicit close", self.index);
        }
    }
}
