//! MongoDB client
//!
//! Maps the store capabilities onto MongoDB:
//! - An index is a collection, named `collection` when the connection URI
//!   names a database and `database.collection` otherwise
//! - A scroll is a `find` cursor drained one page at a time; the server
//!   renews its idle timeout on every `getMore`, so the keep-alive has no
//!   counterpart here
//! - A bulk upsert is a run of unordered `update` commands made of
//!   full-document replacements with `upsert: true`, each kept within the
//!   server's statement count and BSON size limits
//!
//! Documents travel as canonical extended JSON so that BSON types survive
//! the round trip through a dump file.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Cursor, Database};
use serde_json::value::RawValue;
use tracing::{debug, info};

use super::{
    BulkItem, BulkResponse, DocumentStore, Page, RetryPolicy, ScrollCursor, ScrollRequest,
    UpsertOp,
};
use crate::error::mongo::describe_write_error;
use crate::error::{ConfigError, DumpError, Result, TransportError};
use crate::record::Record;

const DEFAULT_DATABASE: &str = "test";

/// Server limit on statements in one write command (`maxWriteBatchSize`)
const MAX_WRITE_BATCH: usize = 100_000;

/// Server limit on one BSON document (`maxBsonObjectSize`)
const MAX_BSON_SIZE: usize = 16 * 1024 * 1024;

/// Bytes of a command reserved for everything but its `updates` array
const COMMAND_HEADROOM: usize = 16 * 1024;

/// Budget for the `updates` array of one command
const MAX_UPDATES_BYTES: usize = MAX_BSON_SIZE - COMMAND_HEADROOM;

/// Client for one MongoDB deployment.
pub struct MongoStore {
    client: Client,
    default_database: Option<String>,
    retry: RetryPolicy,
}

impl MongoStore {
    /// Connect to the deployment named by a MongoDB URI
    ///
    /// # Arguments
    /// * `uri` - `mongodb://` or `mongodb+srv://` connection string
    /// * `timeout` - Connect and server selection timeout
    /// * `retry` - Retry policy for transient failures
    ///
    /// # Returns
    /// * `Result<Self>` - Connected client or error
    pub async fn connect(uri: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("invalid MongoDB URI: {e}"))
        })?;
        options.app_name = Some("docdump".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.retry_reads = Some(true);
        options.retry_writes = Some(true);

        let default_database = options.default_database.clone();
        let client = Client::with_options(options)?;

        Ok(Self {
            client,
            default_database,
            retry,
        })
    }

    /// Resolve an index name to a (database, collection) pair.
    fn namespace<'a>(&'a self, index: &'a str) -> Result<(&'a str, &'a str)> {
        let (database, collection) = match self.default_database.as_deref() {
            Some(database) => (database, index),
            None => index.split_once('.').unwrap_or((DEFAULT_DATABASE, index)),
        };
        if database.is_empty() || collection.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "index".to_string(),
                value: index.to_string(),
            }
            .into());
        }
        Ok((database, collection))
    }

    fn collection(&self, index: &str) -> Result<mongodb::Collection<Document>> {
        let (database, collection) = self.namespace(index)?;
        Ok(self.client.database(database).collection(collection))
    }
}

/// Turn a raw JSON query into a filter document.
fn query_filter(query: Option<&RawValue>) -> Result<Document> {
    let Some(raw) = query else {
        return Ok(Document::new());
    };
    let value: serde_json::Value = serde_json::from_str(raw.get())
        .map_err(|e| ConfigError::InvalidQuery(e.to_string()))?;
    match Bson::try_from(value) {
        Ok(Bson::Document(filter)) => Ok(filter),
        Ok(other) => Err(ConfigError::InvalidQuery(format!(
            "filter must be a document, found {:?}",
            other.element_type()
        ))
        .into()),
        Err(e) => Err(ConfigError::InvalidQuery(e.to_string()).into()),
    }
}

/// Convert a stored document into a record.
fn document_to_record(document: Document) -> Result<Record> {
    let id = match document.get("_id") {
        Some(Bson::String(s)) => s.clone(),
        Some(other) => other.clone().into_canonical_extjson().to_string(),
        None => {
            return Err(
                TransportError::MalformedResponse("document without _id".to_string()).into(),
            );
        }
    };
    let source = serde_json::value::to_raw_value(&Bson::Document(document).into_canonical_extjson())
        .map_err(DumpError::malformed)?;
    Ok(Record::new(id, "", Some(source)))
}

/// Build the replacement document for one upsert.
///
/// The `_id` stored in the source wins, so ids that are not strings keep
/// their BSON type; the record id is the fallback.
fn replacement(op: &UpsertOp) -> std::result::Result<(Bson, Document), String> {
    let mut document = match op.source.as_deref() {
        None => Document::new(),
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw.get()).map_err(|e| e.to_string())?;
            match Bson::try_from(value).map_err(|e| e.to_string())? {
                Bson::Document(document) => document,
                other => return Err(format!("source is not a document: {:?}", other.element_type())),
            }
        }
    };
    let id = match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::String(op.id.clone());
            document.insert("_id", id.clone());
            id
        }
    };
    Ok((id, document))
}

/// One entry of an `update` command's `updates` array.
struct Statement {
    /// Position of the originating op
    position: usize,
    update: Document,
    /// Encoded size inside the array
    size: usize,
}

/// Build the update statements for `ops`.
///
/// Ops that cannot be sent are recorded as failed in `items` and left out.
fn statements(ops: &[UpsertOp], items: &mut [Option<BulkItem>]) -> Vec<Statement> {
    let mut statements = Vec::with_capacity(ops.len());
    for (position, op) in ops.iter().enumerate() {
        let update = match replacement(op) {
            Ok((id, document)) => doc! {
                "q": { "_id": id },
                "u": document,
                "upsert": true,
            },
            Err(reason) => {
                items[position] = Some(failed_item(op, reason));
                continue;
            }
        };
        // Array element overhead: type byte, decimal key and its terminator
        let size = match mongodb::bson::to_vec(&update) {
            Ok(bytes) => bytes.len() + 8,
            Err(e) => {
                items[position] = Some(failed_item(op, e.to_string()));
                continue;
            }
        };
        if size > MAX_UPDATES_BYTES {
            items[position] = Some(failed_item(
                op,
                format!("document of {size} bytes exceeds the {MAX_BSON_SIZE} byte BSON limit"),
            ));
            continue;
        }
        statements.push(Statement {
            position,
            update,
            size,
        });
    }
    statements
}

/// Split consecutive statements into runs of at most `max_count` entries
/// and `max_bytes` encoded bytes. A statement larger than `max_bytes` gets
/// a run of its own.
fn chunk_ranges(sizes: &[usize], max_count: usize, max_bytes: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut bytes = 0;
    for (i, &size) in sizes.iter().enumerate() {
        if i - start >= max_count || (i > start && bytes + size > max_bytes) {
            ranges.push(start..i);
            start = i;
            bytes = 0;
        }
        bytes += size;
    }
    if start < sizes.len() {
        ranges.push(start..sizes.len());
    }
    ranges
}

/// Record the `writeErrors` of one command reply against the ops of
/// `chunk`, whose positions the reply's `index` fields are relative to.
fn apply_write_errors(
    reply: &Document,
    chunk: &[Statement],
    ops: &[UpsertOp],
    items: &mut [Option<BulkItem>],
) -> Result<()> {
    if let Ok(errors) = reply.get_array("writeErrors") {
        for error in errors.iter().filter_map(Bson::as_document) {
            let position = error
                .get_i32("index")
                .ok()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| chunk.get(i))
                .map(|statement| statement.position);
            let Some(position) = position else {
                return Err(TransportError::MalformedResponse(format!(
                    "write error without a valid index: {error}"
                ))
                .into());
            };
            let code = error.get_i32("code").unwrap_or_default();
            let message = error.get_str("errmsg").unwrap_or("unknown error");
            items[position] = Some(failed_item(&ops[position], describe_write_error(code, message)));
        }
    }
    if let Ok(wc_error) = reply.get_document("writeConcernError") {
        return Err(TransportError::BulkFailed(format!(
            "write concern error: {}",
            wc_error.get_str("errmsg").unwrap_or("unknown")
        ))
        .into());
    }
    Ok(())
}

fn failed_item(op: &UpsertOp, reason: String) -> BulkItem {
    BulkItem {
        id: op.id.clone(),
        doc_type: op.doc_type.clone(),
        status: 400,
        error: Some(reason),
    }
}

/// Find cursor drained page by page.
pub struct MongoScroll {
    cursor: Option<Cursor<Document>>,
    page_size: u32,
    total_hits: u64,
    fetched: u64,
    closed: bool,
}

#[async_trait]
impl ScrollCursor for MongoScroll {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.closed {
            return Ok(None);
        }
        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut records = Vec::with_capacity(self.page_size as usize);
        for _ in 0..self.page_size {
            match cursor.try_next().await {
                Ok(Some(document)) => records.push(document_to_record(document)?),
                Ok(None) => break,
                Err(e) => {
                    self.cursor = None;
                    self.closed = true;
                    return Err(TransportError::ScrollFailed(e.to_string()).into());
                }
            }
        }

        if records.is_empty() {
            debug!("Find cursor exhausted after {} documents", self.fetched);
            self.cursor = None;
            self.closed = true;
            return Ok(None);
        }

        self.fetched += records.len() as u64;
        Ok(Some(Page {
            records,
            total_hits: self.total_hits.max(self.fetched),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            // Dropping the cursor kills it on the server.
            self.cursor = None;
            self.closed = true;
            info!("Closed find cursor after {} documents", self.fetched);
        }
        Ok(())
    }
}

impl MongoStore {
    /// Send one `update` command for `chunk`.
    async fn run_update(
        &self,
        db: &Database,
        collection: &str,
        chunk: &[Statement],
    ) -> Result<Document> {
        let updates: Vec<Bson> = chunk
            .iter()
            .map(|statement| Bson::Document(statement.update.clone()))
            .collect();
        let command = doc! {
            "update": collection,
            "updates": updates,
            "ordered": false,
        };
        debug!("Sending update command of {} statements", chunk.len());

        self.retry
            .run("bulk upsert", |_| {
                let db = db.clone();
                let command = command.clone();
                async move { Ok(db.run_command(command).await?) }
            })
            .await
            .map_err(|e| TransportError::BulkFailed(e.to_string()).into())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        let admin = self.client.database("admin");
        self.retry
            .run("ping", |_| {
                let admin = admin.clone();
                async move {
                    admin.run_command(doc! { "ping": 1 }).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn open_scroll(&self, request: &ScrollRequest) -> Result<Box<dyn ScrollCursor>> {
        let collection = self.collection(&request.index)?;
        let filter = query_filter(request.query.as_deref())?;

        let total_hits = self
            .retry
            .run("count", |_| {
                let collection = collection.clone();
                let filter = filter.clone();
                async move { Ok(collection.count_documents(filter).await?) }
            })
            .await?;

        let page_size = request.page_size;
        let cursor = self
            .retry
            .run("find", |_| {
                let collection = collection.clone();
                let filter = filter.clone();
                async move { Ok(collection.find(filter).batch_size(page_size).await?) }
            })
            .await?;

        debug!(
            "Opened find cursor on {} ({} matching documents)",
            request.index, total_hits
        );

        Ok(Box::new(MongoScroll {
            cursor: Some(cursor),
            page_size,
            total_hits,
            fetched: 0,
            closed: false,
        }))
    }

    async fn bulk_upsert(&self, index: &str, ops: &[UpsertOp]) -> Result<BulkResponse> {
        if ops.is_empty() {
            return Ok(BulkResponse::default());
        }
        let (database, collection) = self.namespace(index)?;

        let mut items: Vec<Option<BulkItem>> = vec![None; ops.len()];
        let prepared = statements(ops, &mut items);
        let sizes: Vec<usize> = prepared.iter().map(|s| s.size).collect();

        let db = self.client.database(database);
        for range in chunk_ranges(&sizes, MAX_WRITE_BATCH, MAX_UPDATES_BYTES) {
            let chunk = &prepared[range];
            let reply = self.run_update(&db, collection, chunk).await?;
            apply_write_errors(&reply, chunk, ops, &mut items)?;
        }

        let items: Vec<BulkItem> = ops
            .iter()
            .zip(items)
            .map(|(op, item)| {
                item.unwrap_or_else(|| BulkItem {
                    id: op.id.clone(),
                    doc_type: op.doc_type.clone(),
                    status: 200,
                    error: None,
                })
            })
            .collect();

        Ok(BulkResponse {
            errors: items.iter().any(|i| !i.succeeded()),
            items,
        })
    }
}
