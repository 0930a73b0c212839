//! 📡 Bulk Serializer — formatting operations for the bulk API's peculiar tastes 🚀
//!
//! 🎬 COLD OPEN — INT. ELASTICSEARCH CLUSTER — BULK ENDPOINT — HIGH NOON
//!
//! The bulk API has rules.
//!
//! Rule 1: A header line naming the verb and the coordinates. Then, for anything
//!         that carries a document, exactly one more line. Delete travels alone.
//! Rule 2: Newline-delimited. Not comma-separated. Not XML. NEWLINES.
//! Rule 3: Every line ends with `\n`, including the last one. It MATTERS.
//!
//! ## Knowledge Graph 🧠
//! - Input: `BulkOperation` (index / create / update / delete)
//! - Output: 1–2 `\n`-terminated JSON lines appended to a byte buffer
//! - Optional fields (`_type`, `_id`, `_retry_on_conflict`, `doc_as_upsert`) are
//!   omitted when unset. Absent, not null.
//! - `omit_type_headers` drops `_type` from every header line (typeless clusters)
//! - All-or-nothing: a failing op leaves the caller's buffer untouched

use serde::Serialize;
use serde_json::Value;

use crate::common::{BulkOperation, DocumentTarget};
use crate::error::Result;

/// 📋 The coordinates inside a header line: `{"_index":…,"_type":…,"_id":…}`.
#[derive(Debug, Serialize)]
struct ActionMetadata<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(
        rename = "_retry_on_conflict",
        skip_serializing_if = "Option::is_none"
    )]
    retry_on_conflict: Option<u32>,
}

/// 📦 The header line itself. Externally tagged, so `Update(meta)` becomes
/// `{"update":{...meta...}}`; serde does the envelope for us.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ActionLine<'a> {
    Index(ActionMetadata<'a>),
    Create(ActionMetadata<'a>),
    Update(ActionMetadata<'a>),
    Delete(ActionMetadata<'a>),
}

/// 🔄 The second line of an update: `{"doc":…,"doc_as_upsert":true}`.
#[derive(Debug, Serialize)]
struct UpdatePayload<'a> {
    doc: &'a Value,
    #[serde(skip_serializing_if = "is_false")]
    doc_as_upsert: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// 🎼 Turns operations into bulk lines. Stateless apart from one knob.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkSerializer {
    omit_type_headers: bool,
}

impl BulkSerializer {
    pub fn new(omit_type_headers: bool) -> Self {
        Self { omit_type_headers }
    }

    /// ✍️ Append the op's lines to `out`. On error, `out` is left exactly as it was.
    pub fn write(&self, op: &BulkOperation, out: &mut Vec<u8>) -> Result<()> {
        // 🧮 scratch first, commit after: no half-written operations in a batch
        let mut scratch = Vec::with_capacity(128);
        match op {
            BulkOperation::Index(write) => {
                self.push_line(&mut scratch, &ActionLine::Index(self.metadata(&write.target, None)))?;
                self.push_line(&mut scratch, &write.document)?;
            }
            BulkOperation::Create(write) => {
                self.push_line(&mut scratch, &ActionLine::Create(self.metadata(&write.target, None)))?;
                self.push_line(&mut scratch, &write.document)?;
            }
            BulkOperation::Update(update) => {
                let the_header = self.metadata(&update.target, update.retry_on_conflict);
                self.push_line(&mut scratch, &ActionLine::Update(the_header))?;
                self.push_line(
                    &mut scratch,
                    &UpdatePayload {
                        doc: &update.document,
                        doc_as_upsert: update.doc_as_upsert,
                    },
                )?;
            }
            BulkOperation::Delete(target) => {
                self.push_line(&mut scratch, &ActionLine::Delete(self.metadata(target, None)))?;
            }
        }
        out.extend_from_slice(&scratch);
        Ok(())
    }

    /// 📦 Convenience: one op, its own fresh buffer.
    pub fn serialize(&self, op: &BulkOperation) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(op, &mut out)?;
        Ok(out)
    }

    fn metadata<'a>(
        &self,
        target: &'a DocumentTarget,
        retry_on_conflict: Option<u32>,
    ) -> ActionMetadata<'a> {
        ActionMetadata {
            index: &target.index,
            doc_type: if self.omit_type_headers {
                None
            } else {
                target.doc_type.as_deref()
            },
            id: target.id.as_deref(),
            retry_on_conflict,
        }
    }

    fn push_line(&self, scratch: &mut Vec<u8>, value: &impl Serialize) -> Result<()> {
        serde_json::to_writer(&mut *scratch, value)?;
        scratch.push(b'\n');
        Ok(())
    }
}
