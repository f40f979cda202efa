//! Document store clients
//!
//! The transfer pipelines only need two capabilities from a store:
//! paginated reads through a renewable scroll cursor, and batched upserts.
//! [`DocumentStore`] captures exactly that. Concrete clients:
//!
//! - [`elastic::ElasticStore`]: Elasticsearch-compatible REST API
//! - [`mongo::MongoStore`]: MongoDB through the official driver
//!
//! Transient transport failures are absorbed by each client's
//! [`RetryPolicy`]; whatever a client returns as an error is final.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::error::Result;
use crate::record::Record;

pub mod elastic;
#[cfg(test)]
pub mod memory;
pub mod mongo;
pub mod retry;

pub use retry::RetryPolicy;

/// Parameters for opening a scroll cursor.
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    /// Index (or collection) to read
    pub index: String,
    /// Optional query filter, already validated as JSON
    pub query: Option<Box<RawValue>>,
    /// Number of records per page
    pub page_size: u32,
    /// Lease renewed by every page request, e.g. `1m`
    pub keep_alive: String,
}

/// One page of scroll results.
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<Record>,
    /// Total number of documents matching the query, as reported by the store
    pub total_hits: u64,
}

/// A pending upsert: insert the document if absent, overwrite it otherwise.
#[derive(Debug, Clone)]
pub struct UpsertOp {
    pub id: String,
    pub doc_type: String,
    pub source: Option<Box<RawValue>>,
}

impl From<Record> for UpsertOp {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            doc_type: record.doc_type,
            source: record.source,
        }
    }
}

/// Outcome of a single operation inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: String,
    pub doc_type: String,
    /// Store-specific status code (HTTP status for REST stores)
    pub status: u16,
    /// Failure reason, `None` when the operation was applied
    pub error: Option<String>,
}

impl BulkItem {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Response to a bulk upsert call.
///
/// The call as a whole went through; individual operations may still
/// have failed. `errors` is true when at least one did.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Operations that the store rejected.
    pub fn failed(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| !item.succeeded())
    }
}

/// Server-side pagination session.
#[async_trait]
pub trait ScrollCursor: Send {
    /// Pull the next page, or `None` once the result set is exhausted.
    async fn next_page(&mut self) -> Result<Option<Page>>;

    /// Release the server-side cursor. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;
}

/// Capabilities the transfer pipelines need from a document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for log messages.
    fn name(&self) -> &'static str;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Open a scroll over every document matching the request.
    async fn open_scroll(&self, request: &ScrollRequest) -> Result<Box<dyn ScrollCursor>>;

    /// Apply all operations in one round trip.
    async fn bulk_upsert(&self, index: &str, ops: &[UpsertOp]) -> Result<BulkResponse>;
}

/// Parse a keep-alive such as `30s`, `1m` or `2h` into a duration.
pub fn parse_keep_alive(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    let seconds = match unit {
        "ms" => return Some(Duration::from_millis(amount)),
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keep_alive() {
        assert_eq!(parse_keep_alive("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_keep_alive("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_keep_alive("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_keep_alive("1"), None);
        assert_eq!(parse_keep_alive("m"), None);
        assert_eq!(parse_keep_alive("5y"), None);
    }

    #[test]
    fn test_bulk_response_failed_items() {
        let response = BulkResponse {
            errors: true,
            items: vec![
                BulkItem {
                    id: "1".into(),
                    doc_type: String::new(),
                    status: 200,
                    error: None,
                },
                BulkItem {
                    id: "2".into(),
                    doc_type: String::new(),
                    status: 400,
                    error: Some("mapper_parsing_exception".into()),
                },
            ],
        };
        let failed: Vec<&str> = response.failed().map(|i| i.id.as_str()).collect();
        assert_eq!(failed, vec!["2"]);
    }
}
