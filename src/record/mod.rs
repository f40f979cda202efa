//! The transfer unit moved between a store and dump files.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::DecodeError;

/// One document in transit.
///
/// `source` is carried as raw JSON text: the pipelines forward it
/// unparsed and never look inside it. Two records with the same `id` and
/// `doc_type` describe the same document as far as the store is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// External document identifier, never empty for a valid record
    #[serde(default)]
    pub id: String,

    /// External type label, empty for stores without mapping types
    #[serde(rename = "type", default)]
    pub doc_type: String,

    /// Document body; `None` encodes as `null`
    #[serde(default)]
    pub source: Option<Box<RawValue>>,
}

impl Record {
    /// Create a record from already-serialized source JSON.
    pub fn new(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        source: Option<Box<RawValue>>,
    ) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            source,
        }
    }

    /// Create a record by serializing a JSON value as its source.
    pub fn from_value(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        source: &serde_json::Value,
    ) -> serde_json::Result<Self> {
        let source = match source {
            serde_json::Value::Null => None,
            value => Some(serde_json::value::to_raw_value(value)?),
        };
        Ok(Self::new(id, doc_type, source))
    }

    /// Raw source JSON text, if any.
    pub fn source_json(&self) -> Option<&str> {
        self.source.as_deref().map(RawValue::get)
    }

    /// Check the invariants every record must hold before it is written.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.id.is_empty() {
            return Err(DecodeError::MissingId);
        }
        if let Some(raw) = self.source_json() {
            match json_kind(raw) {
                "object" | "null" => {}
                other => return Err(DecodeError::InvalidSource(other)),
            }
        }
        Ok(())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.doc_type == other.doc_type
            && self.source_json() == other.source_json()
    }
}

impl Eq for Record {}

/// Name the kind of a JSON text from its first significant byte.
fn json_kind(raw: &str) -> &'static str {
    match raw.trim_start().as_bytes().first() {
        Some(b'{') => "object",
        Some(b'[') => "array",
        Some(b'"') => "string",
        Some(b't') | Some(b'f') => "boolean",
        Some(b'n') => "null",
        _ => "number",
    }
}
