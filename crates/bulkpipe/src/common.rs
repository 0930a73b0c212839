//! 📦 Common data structures — the building blocks of bulkpipe
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. BULK ENDPOINT — 3:47 AM
//!
//! An update walks in. It knows its index. It knows its id. It carries a document
//! and a suspicious `doc_as_upsert: true` it swears it can explain. Right behind
//! it, a delete for the document next door. Order matters tonight. It always does.
//!
//! 🦆
//!
//! ---
//!
//! This module defines the operation model (`BulkOperation` and friends) and the
//! sealed `Batch` the batching stage hands downstream. Operations are a closed sum
//! type: the compiler guarantees a Delete never smuggles a document, and that
//! Index/Create/Update always bring one.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// 🎯 Where a document lives: index, optional legacy `_type`, optional `_id`.
///
/// `_type` is deprecated in newer clusters; see `omit_type_headers` for the
/// switch that drops it from the wire entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTarget {
    pub index: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl DocumentTarget {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            id: None,
        }
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 📝 An index or create: a target plus the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentWrite {
    #[serde(flatten)]
    pub target: DocumentTarget,
    pub document: Value,
}

impl DocumentWrite {
    /// 🏗️ Accepts anything serde can turn into JSON. Maps with non-string keys and
    /// other JSON-incompatible shapes fail here, before they ever reach a batch.
    pub fn new(target: DocumentTarget, document: impl Serialize) -> Result<Self> {
        Ok(Self {
            target,
            document: serde_json::to_value(document)?,
        })
    }
}

/// 🔄 A partial update: merged into the stored document, optionally upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(flatten)]
    pub target: DocumentTarget,
    pub document: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_conflict: Option<u32>,
    #[serde(default)]
    pub doc_as_upsert: bool,
}

impl DocumentUpdate {
    pub fn new(target: DocumentTarget, document: impl Serialize) -> Result<Self> {
        Ok(Self {
            target,
            document: serde_json::to_value(document)?,
            retry_on_conflict: None,
            doc_as_upsert: false,
        })
    }

    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self
    }

    pub fn doc_as_upsert(mut self, doc_as_upsert: bool) -> Self {
        self.doc_as_upsert = doc_as_upsert;
        self
    }
}

/// 🎭 One write headed for `_bulk`. Four verbs, one enum, zero virtual dispatch.
///
/// Deserializes from tagged JSON so operations can be streamed in as NDJSON:
///
/// ```text
/// {"op":"update","index":"test-index","id":"123","document":{"foo":"bar"},"doc_as_upsert":true}
/// {"op":"delete","index":"test-index","id":"124"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BulkOperation {
    /// replaces the doc
    Index(DocumentWrite),
    /// creates the doc, fails if it already exists
    Create(DocumentWrite),
    Update(DocumentUpdate),
    Delete(DocumentTarget),
}

impl BulkOperation {
    pub fn index(target: DocumentTarget, document: impl Serialize) -> Result<Self> {
        Ok(Self::Index(DocumentWrite::new(target, document)?))
    }

    pub fn create(target: DocumentTarget, document: impl Serialize) -> Result<Self> {
        Ok(Self::Create(DocumentWrite::new(target, document)?))
    }

    pub fn update(update: DocumentUpdate) -> Self {
        Self::Update(update)
    }

    pub fn delete(target: DocumentTarget) -> Self {
        Self::Delete(target)
    }

    /// 📡 The `_bulk` action verb, as it appears on the header line.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Index(_) => "index",
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }

    pub fn target(&self) -> &DocumentTarget {
        match self {
            Self::Index(write) | Self::Create(write) => &write.target,
            Self::Update(update) => &update.target,
            Self::Delete(target) => target,
        }
    }
}

/// 🧱 A sealed, immutable bulk body.
///
/// Always zero or more complete operation line groups, always `\n`-terminated when
/// non-empty. Backed by `Bytes`, so handing the same batch to N endpoints is N
/// refcount bumps, not N memcpys. The fan-out stage thanks you for your service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch(Bytes);

impl Batch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Batch {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}
