//! Elasticsearch-compatible REST client
//!
//! Reads use the scroll API (`_search?scroll=` followed by
//! `_search/scroll`), writes use `_bulk` with `update` actions and
//! `doc_as_upsert`. Endpoints are tried round-robin across retries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, trace};

use super::{
    BulkItem, BulkResponse, DocumentStore, Page, RetryPolicy, ScrollCursor, ScrollRequest,
    UpsertOp,
};
use crate::error::{DumpError, Result, TransportError};
use crate::record::Record;

/// Mapping type that stands for "no type" on 7.x clusters.
const DEFAULT_TYPE: &str = "_doc";

/// Client for one Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticStore {
    http: reqwest::Client,
    endpoints: Vec<String>,
    retry: RetryPolicy,
}

impl ElasticStore {
    /// Create a client for the given endpoints
    ///
    /// # Arguments
    /// * `endpoints` - Base URLs such as `http://host07:9200`
    /// * `timeout` - Per-request timeout
    /// * `retry` - Retry policy for transient failures
    ///
    /// # Returns
    /// * `Result<Self>` - New client or error
    pub fn new(endpoints: Vec<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(TransportError::ConnectionFailed("no endpoints given".into()).into());
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("docdump/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoints: endpoints
                .into_iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .collect(),
            retry,
        })
    }

    fn endpoint(&self, attempt: u32) -> &str {
        &self.endpoints[attempt as usize % self.endpoints.len()]
    }

    /// Send a request built against the endpoint chosen for each attempt
    /// and return the body of the first successful response.
    async fn send<F>(&self, what: &str, build: F) -> Result<Vec<u8>>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        self.send_with(what, true, build).await
    }

    /// Like [`send`](Self::send), but when `replayable` is false a timed
    /// out request is not sent again: the server may already have acted
    /// on it.
    async fn send_with<F>(&self, what: &str, replayable: bool, build: F) -> Result<Vec<u8>>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        self.retry
            .run(what, |attempt| {
                let request = build(&self.http, self.endpoint(attempt));
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| request_error(e, replayable))?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(TransportError::Status {
                            status: status.as_u16(),
                            body,
                        }
                        .into());
                    }
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| request_error(e, replayable))?;
                    Ok(body.to_vec())
                }
            })
            .await
    }
}

fn request_error(err: reqwest::Error, replayable: bool) -> DumpError {
    if err.is_timeout() && !replayable {
        return TransportError::RequestFailed {
            transient: false,
            message: format!("{err} (not retried, the request may have been applied)"),
        }
        .into();
    }
    err.into()
}

/* ========================= Wire types ========================= */

#[derive(Serialize)]
struct SearchBody<'a> {
    size: u32,
    sort: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a RawValue>,
}

#[derive(Serialize)]
struct ScrollBody<'a> {
    scroll: &'a str,
    scroll_id: &'a str,
}

#[derive(Serialize)]
struct ClearScrollBody<'a> {
    scroll_id: [&'a str; 1],
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is a number before 7.0 and an object since.
#[derive(Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

impl Total {
    fn value(&self) -> u64 {
        match self {
            Total::Count(n) | Total::Object { value: n } => *n,
        }
    }
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type", default)]
    doc_type: String,
    #[serde(rename = "_source")]
    source: Option<Box<RawValue>>,
}

#[derive(Serialize)]
struct BulkAction<'a> {
    update: BulkActionMeta<'a>,
}

#[derive(Serialize)]
struct BulkActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
}

#[derive(Serialize)]
struct BulkUpsertDoc<'a> {
    doc: &'a RawValue,
    doc_as_upsert: bool,
}

#[derive(Deserialize)]
struct BulkResponseBody {
    errors: bool,
    items: Vec<HashMap<String, BulkItemBody>>,
}

#[derive(Deserialize)]
struct BulkItemBody {
    status: u16,
    error: Option<serde_json::Value>,
}

/// Render the `error` member of a bulk item as `type: reason`.
fn describe_item_error(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::Object(map) => {
            let kind = map.get("type").and_then(|v| v.as_str());
            let reason = map.get("reason").and_then(|v| v.as_str());
            match (kind, reason) {
                (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                (None, Some(reason)) => reason.to_string(),
                _ => error.to_string(),
            }
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialize operations as an NDJSON `_bulk` body.
fn bulk_body(index: &str, ops: &[UpsertOp]) -> Result<Vec<u8>> {
    let empty = RawValue::from_string("{}".to_string())
        .map_err(|e| DumpError::encoding("bulk request", e))?;
    let mut body = Vec::with_capacity(ops.len() * 128);

    for op in ops {
        let doc_type = Some(op.doc_type.as_str()).filter(|t| !t.is_empty() && *t != DEFAULT_TYPE);
        serde_json::to_writer(
            &mut body,
            &BulkAction {
                update: BulkActionMeta {
                    index,
                    id: &op.id,
                    doc_type,
                },
            },
        )
        .map_err(|e| DumpError::encoding("bulk request", e))?;
        body.push(b'\n');
        serde_json::to_writer(
            &mut body,
            &BulkUpsertDoc {
                doc: op.source.as_deref().unwrap_or(&*empty),
                doc_as_upsert: true,
            },
        )
        .map_err(|e| DumpError::encoding("bulk request", e))?;
        body.push(b'\n');
    }

    Ok(body)
}

/// Pair bulk response items with the operations that produced them.
fn bulk_response(ops: &[UpsertOp], body: &[u8]) -> Result<BulkResponse> {
    let parsed: BulkResponseBody = serde_json::from_slice(body).map_err(DumpError::malformed)?;
    if parsed.items.len() != ops.len() {
        return Err(TransportError::MalformedResponse(format!(
            "bulk response has {} items for {} operations",
            parsed.items.len(),
            ops.len()
        ))
        .into());
    }

    let mut items = Vec::with_capacity(ops.len());
    for (op, mut item) in ops.iter().zip(parsed.items) {
        let result = item.remove("update").or_else(|| item.into_values().next());
        let Some(result) = result else {
            return Err(
                TransportError::MalformedResponse("empty bulk response item".into()).into(),
            );
        };
        let error = match result.error {
            Some(ref e) => Some(describe_item_error(e)),
            None if result.status >= 300 => Some(format!("status {}", result.status)),
            None => None,
        };
        items.push(BulkItem {
            id: op.id.clone(),
            doc_type: op.doc_type.clone(),
            status: result.status,
            error,
        });
    }

    Ok(BulkResponse {
        errors: parsed.errors || items.iter().any(|i| !i.succeeded()),
        items,
    })
}

/* ========================= Scroll cursor ========================= */

/// Scroll session over one search.
pub struct ElasticScroll {
    store: ElasticStore,
    request: ScrollRequest,
    scroll_id: Option<String>,
    exhausted: bool,
    cleared: bool,
}

impl ElasticScroll {
    fn new(store: ElasticStore, request: ScrollRequest) -> Self {
        Self {
            store,
            request,
            scroll_id: None,
            exhausted: false,
            cleared: false,
        }
    }

    async fn fetch(&self) -> Result<SearchResponse> {
        let keep_alive = self.request.keep_alive.as_str();
        let body = match &self.scroll_id {
            None => serde_json::to_vec(&SearchBody {
                size: self.request.page_size,
                sort: ["_doc"],
                query: self.request.query.as_deref(),
            }),
            Some(id) => serde_json::to_vec(&ScrollBody {
                scroll: keep_alive,
                scroll_id: id,
            }),
        }
        .map_err(|e| DumpError::encoding("search request", e))?;
        let path = match &self.scroll_id {
            None => format!("{}/_search?scroll={}", self.request.index, keep_alive),
            Some(_) => "_search/scroll".to_string(),
        };

        // Re-sending a continuation after a timeout could skip a page the
        // server already handed out
        let replayable = self.scroll_id.is_none();
        let bytes = self
            .store
            .send_with("scroll", replayable, |http, endpoint| {
                http.request(Method::POST, format!("{endpoint}/{path}"))
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await
            .map_err(|e| match e {
                DumpError::Transport(TransportError::Status { status, body }) => {
                    TransportError::ScrollFailed(format!("status {status}: {body}")).into()
                }
                other => other,
            })?;

        serde_json::from_slice(&bytes).map_err(DumpError::malformed)
    }
}

#[async_trait]
impl ScrollCursor for ElasticScroll {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let response = self.fetch().await?;
        if response.scroll_id.is_some() {
            self.scroll_id = response.scroll_id;
        }

        if response.hits.hits.is_empty() {
            debug!("Scroll over {:?} exhausted", self.request.index);
            self.exhausted = true;
            self.close().await?;
            return Ok(None);
        }

        let total_hits = response.hits.total.as_ref().map_or(0, Total::value);
        let records: Vec<Record> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| Record::new(hit.id, hit.doc_type, hit.source))
            .collect();
        trace!("Scroll page of {} hits (total {})", records.len(), total_hits);

        Ok(Some(Page {
            records,
            total_hits,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        if self.cleared {
            return Ok(());
        }
        self.cleared = true;
        self.exhausted = true;

        let Some(id) = self.scroll_id.take() else {
            return Ok(());
        };
        let body = serde_json::to_vec(&ClearScrollBody { scroll_id: [&id] })
            .map_err(|e| DumpError::encoding("clear scroll request", e))?;
        let cleared = self
            .store
            .send("clear scroll", |http, endpoint| {
                http.request(Method::DELETE, format!("{endpoint}/_search/scroll"))
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await;

        // The lease expires on its own; failing to clear it early is not fatal.
        if let Err(e) = cleared {
            debug!("Could not clear scroll: {}", e);
        }
        Ok(())
    }
}

/* ========================= Store ========================= */

#[async_trait]
impl DocumentStore for ElasticStore {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<()> {
        self.send("ping", |http, endpoint| http.get(format!("{endpoint}/")))
            .await
            .map(|_| ())
    }

    async fn open_scroll(&self, request: &ScrollRequest) -> Result<Box<dyn ScrollCursor>> {
        Ok(Box::new(ElasticScroll::new(self.clone(), request.clone())))
    }

    async fn bulk_upsert(&self, index: &str, ops: &[UpsertOp]) -> Result<BulkResponse> {
        if ops.is_empty() {
            return Ok(BulkResponse::default());
        }
        let body = bulk_body(index, ops)?;
        debug!("Sending bulk request of {} operations ({} bytes)", ops.len(), body.len());

        let bytes = self
            .send("bulk upsert", |http, endpoint| {
                http.request(Method::POST, format!("{endpoint}/_bulk"))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await
            .map_err(|e| match e {
                DumpError::Transport(TransportError::Status { status, body }) => {
                    TransportError::BulkFailed(format!("status {status}: {body}")).into()
                }
                other => other,
            })?;

        bulk_response(ops, &bytes)
    }
}
