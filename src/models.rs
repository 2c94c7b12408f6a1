//! Core data models shared across the extraction, indexing, and retrieval
//! pipeline.
//!
//! A [`Fragment`] is the smallest indexed unit of text: it is produced by the
//! extractor, linked into a prev/next chain by the indexer, and then written
//! into the document store as one or more [`StoredDocument`] records (the
//! downstream splitter may subdivide a fragment into several records,
//! distinguished by `split_id`).

use serde::{Deserialize, Serialize};

/// Smallest indexed unit of extracted text.
///
/// Ids are assigned monotonically across a whole extraction run — they are
/// never reset per file, so the prev/next chain built from them spans file
/// boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: u64,
    pub text: String,
    pub meta: FragmentMeta,
}

impl Fragment {
    pub fn new(id: u64, text: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            meta: FragmentMeta {
                document: document.into(),
                prev: None,
                next: None,
            },
        }
    }
}

/// Metadata carried by a [`Fragment`].
///
/// `prev`/`next` are filled in by the metadata enricher just before the
/// store write; until then they are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentMeta {
    /// Source file identifier (path of the file the fragment came from).
    pub document: String,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

/// A record as held by (and retrieved from) the document store.
///
/// After ingestion the store owns the record; the core never mutates it in
/// place. Retrieval strategies attach a `score`, and the retrieval enricher
/// may replace `content` with a merged passage while preserving the original
/// hit's `score` and `meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Store-assigned record id (UUID string).
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub meta: DocMeta,
}

/// Store-side metadata for a [`StoredDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    /// Source file the fragment came from.
    pub file: String,
    /// Run-scoped fragment id this record belongs to.
    pub fragment_id: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
    /// Sub-document index assigned by the splitter (0 for the first, and
    /// usually only, record of a fragment).
    pub split_id: i64,
    /// Extended passage looked up from the offline context artifact; only
    /// present on documents returned by the summarization pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_content: Option<String>,
}

impl DocMeta {
    pub fn new(file: impl Into<String>, fragment_id: u64) -> Self {
        Self {
            file: file.into(),
            fragment_id,
            prev: None,
            next: None,
            split_id: 0,
            extended_content: None,
        }
    }
}

/// Merge several documents into one logical result by concatenating their
/// content in order. Identity (id, meta, score) is taken from the first
/// document; callers that need different identity overwrite it afterwards.
///
/// Panics on an empty slice — callers always pass at least the focal hit.
pub fn merge_documents(docs: &[StoredDocument]) -> StoredDocument {
    let first = &docs[0];
    let content = docs
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    StoredDocument {
        id: first.id.clone(),
        content,
        score: first.score,
        meta: first.meta.clone(),
    }
}
