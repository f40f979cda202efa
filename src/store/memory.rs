//! In-process store used by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BulkItem, BulkResponse, DocumentStore, Page, ScrollCursor, ScrollRequest, UpsertOp};
use crate::error::{Result, TransportError};
use crate::record::Record;

/// Documents kept in insertion order per index, with upsert semantics.
#[derive(Default)]
pub struct MemoryStore {
    indexes: Mutex<HashMap<String, Vec<Record>>>,
    /// Ids the store rejects inside bulk requests
    rejected_ids: HashSet<String>,
    /// Fail every bulk call outright
    fail_bulk: bool,
    /// Fail the scroll after this many pages
    fail_scroll_after: Option<usize>,
    bulk_calls: Mutex<Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(index: &str, records: Vec<Record>) -> Self {
        let store = Self::new();
        store
            .indexes
            .lock()
            .unwrap()
            .insert(index.to_string(), records);
        store
    }

    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected_ids.insert(id.to_string());
        self
    }

    pub fn failing_bulk(mut self) -> Self {
        self.fail_bulk = true;
        self
    }

    pub fn failing_scroll_after(mut self, pages: usize) -> Self {
        self.fail_scroll_after = Some(pages);
        self
    }

    pub fn records(&self, index: &str) -> Vec<Record> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of operations in each bulk call, in call order.
    pub fn bulk_calls(&self) -> Vec<usize> {
        self.bulk_calls.lock().unwrap().clone()
    }
}

struct MemoryCursor {
    records: std::vec::IntoIter<Record>,
    total: u64,
    page_size: usize,
    pages: usize,
    fail_after: Option<usize>,
}

#[async_trait]
impl ScrollCursor for MemoryCursor {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.fail_after == Some(self.pages) {
            return Err(TransportError::ScrollFailed("scroll context lost".into()).into());
        }
        let records: Vec<Record> = self.records.by_ref().take(self.page_size).collect();
        if records.is_empty() {
            return Ok(None);
        }
        self.pages += 1;
        Ok(Some(Page {
            records,
            total_hits: self.total,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn open_scroll(&self, request: &ScrollRequest) -> Result<Box<dyn ScrollCursor>> {
        let records = self.records(&request.index);
        Ok(Box::new(MemoryCursor {
            total: records.len() as u64,
            records: records.into_iter(),
            page_size: request.page_size as usize,
            pages: 0,
            fail_after: self.fail_scroll_after,
        }))
    }

    async fn bulk_upsert(&self, index: &str, ops: &[UpsertOp]) -> Result<BulkResponse> {
        self.bulk_calls.lock().unwrap().push(ops.len());
        if self.fail_bulk {
            return Err(TransportError::BulkFailed("connection reset".into()).into());
        }

        let mut indexes = self.indexes.lock().unwrap();
        let docs = indexes.entry(index.to_string()).or_default();
        let mut response = BulkResponse::default();

        for op in ops {
            if self.rejected_ids.contains(&op.id) {
                response.errors = true;
                response.items.push(BulkItem {
                    id: op.id.clone(),
                    doc_type: op.doc_type.clone(),
                    status: 400,
                    error: Some("document rejected".into()),
                });
                continue;
            }

            let record = Record::new(op.id.clone(), op.doc_type.clone(), op.source.clone());
            let existing = docs
                .iter_mut()
                .find(|d| d.id == op.id && d.doc_type == op.doc_type);
            let status = match existing {
                Some(doc) => {
                    *doc = record;
                    200
                }
                None => {
                    docs.push(record);
                    201
                }
            };
            response.items.push(BulkItem {
                id: op.id.clone(),
                doc_type: op.doc_type.clone(),
                status,
                error: None,
            });
        }

        Ok(response)
    }
}
