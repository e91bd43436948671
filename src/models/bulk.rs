//! Bulk request bodies.
//!
//! Every body is NDJSON: one action line per operation, followed by a source
//! line for everything except deletes. Each line, including the last, ends
//! with `\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use crate::error::{EsError, Result};

/// Conflict retries requested from the store for every upsert.
pub const RETRY_ON_CONFLICT: u32 = 3;
pub const DOC_TYPE: &str = "_doc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperation {
    /// `create`, fails on the store side if the id already exists.
    Insert,
    /// `update` with `doc_as_upsert`, merges fields into an existing document.
    Upsert,
    /// `index`, replaces the whole document and bumps its version.
    Index,
    Delete,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Insert => "create",
            BulkOperation::Upsert => "update",
            BulkOperation::Index => "index",
            BulkOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ActionLine<'a> {
    Create(ActionMeta<'a>),
    Update(ActionMeta<'a>),
    Index(ActionMeta<'a>),
    Delete(ActionMeta<'a>),
}

#[derive(Debug, Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_on_conflict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct UpsertSource<'a, D: Serialize> {
    doc: &'a D,
    doc_as_upsert: bool,
}

/// A finished bulk request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkBody {
    text: String,
    actions: usize,
}

impl BulkBody {
    pub fn as_str(&self) -> &str {
        &self.text
    }
    pub fn into_string(self) -> String {
        self.text
    }
    /// Number of operations (action lines) in the body.
    pub fn get_actions(&self) -> usize {
        self.actions
    }
    pub fn is_empty(&self) -> bool {
        self.actions == 0
    }
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

pub struct BulkBodyBuilder<'a> {
    index: &'a str,
    text: String,
    actions: usize,
}

impl<'a> BulkBodyBuilder<'a> {
    pub fn new(index: &'a str) -> Self {
        Self {
            index,
            text: String::new(),
            actions: 0,
        }
    }

    pub fn push_create<D: Document>(&mut self, position: usize, doc: &D) -> Result<()> {
        let id = checked_id(position, doc)?;
        self.push_line(&ActionLine::Create(ActionMeta {
            index: self.index,
            id,
            doc_type: Some(DOC_TYPE),
            retry_on_conflict: None,
        }))?;
        self.push_line(doc)?;
        self.actions += 1;
        Ok(())
    }

    pub fn push_upsert<D: Document>(&mut self, position: usize, doc: &D) -> Result<()> {
        let id = checked_id(position, doc)?;
        self.push_line(&ActionLine::Update(ActionMeta {
            index: self.index,
            id,
            doc_type: Some(DOC_TYPE),
            retry_on_conflict: Some(RETRY_ON_CONFLICT),
        }))?;
        self.push_line(&UpsertSource {
            doc,
            doc_as_upsert: true,
        })?;
        self.actions += 1;
        Ok(())
    }

    pub fn push_index<D: Document>(&mut self, position: usize, doc: &D) -> Result<()> {
        let id = checked_id(position, doc)?;
        self.push_line(&ActionLine::Index(ActionMeta {
            index: self.index,
            id,
            doc_type: None,
            retry_on_conflict: None,
        }))?;
        self.push_line(doc)?;
        self.actions += 1;
        Ok(())
    }

    pub fn push_delete(&mut self, position: usize, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(EsError::MissingId { position });
        }
        self.push_line(&ActionLine::Delete(ActionMeta {
            index: self.index,
            id,
            doc_type: None,
            retry_on_conflict: None,
        }))?;
        self.actions += 1;
        Ok(())
    }

    pub fn push<D: Document>(
        &mut self,
        operation: BulkOperation,
        position: usize,
        doc: &D,
    ) -> Result<()> {
        match operation {
            BulkOperation::Insert => self.push_create(position, doc),
            BulkOperation::Upsert => self.push_upsert(position, doc),
            BulkOperation::Index => self.push_index(position, doc),
            BulkOperation::Delete => self.push_delete(position, doc.document_id()),
        }
    }

    pub fn finish(self) -> BulkBody {
        BulkBody {
            text: self.text,
            actions: self.actions,
        }
    }

    fn push_line<T: Serialize + ?Sized>(&mut self, line: &T) -> Result<()> {
        let json = serde_json::to_string(line).map_err(EsError::Serialize)?;
        self.text.push_str(&json);
        self.text.push('\n');
        Ok(())
    }
}

fn checked_id<D: Document>(position: usize, doc: &D) -> Result<&str> {
    let id = doc.document_id();
    if id.is_empty() {
        Err(EsError::MissingId { position })
    } else {
        Ok(id)
    }
}

/// Builds a body for `operation` over all `docs`. Fails on the first
/// document that has no id or cannot be serialized.
pub fn build_body<D: Document>(
    operation: BulkOperation,
    index: &str,
    docs: &[D],
) -> Result<BulkBody> {
    let mut builder = BulkBodyBuilder::new(index);
    for (position, doc) in docs.iter().enumerate() {
        builder.push(operation, position, doc)?;
    }
    Ok(builder.finish())
}

pub fn insert_body<D: Document>(index: &str, docs: &[D]) -> Result<BulkBody> {
    build_body(BulkOperation::Insert, index, docs)
}

pub fn upsert_body<D: Document>(index: &str, docs: &[D]) -> Result<BulkBody> {
    build_body(BulkOperation::Upsert, index, docs)
}

pub fn index_body<D: Document>(index: &str, docs: &[D]) -> Result<BulkBody> {
    build_body(BulkOperation::Index, index, docs)
}

/// Delete lines for `ids`; `offset` is the position of `ids[0]` in the
/// caller's full list and only shows up in errors.
pub fn delete_body<S: AsRef<str>>(index: &str, ids: &[S], offset: usize) -> Result<BulkBody> {
    let mut builder = BulkBodyBuilder::new(index);
    for (position, id) in ids.iter().enumerate() {
        builder.push_delete(offset + position, id.as_ref())?;
    }
    Ok(builder.finish())
}

/// What the store answered to one bulk call. Only used for logging; item
/// level failures do not turn the call into an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkSummary {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default, deserialize_with = "count_items")]
    pub items: usize,
}

fn count_items<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items.len())
}

impl BulkSummary {
    /// Folds the summary of another chunk into this one.
    pub fn merge(&mut self, other: &BulkSummary) {
        self.took += other.took;
        self.errors |= other.errors;
        self.items += other.items;
    }
}
