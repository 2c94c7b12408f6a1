//! Storage abstraction for Quarry.
//!
//! The [`DocumentStore`] trait defines all storage operations needed by the
//! indexing and retrieval pipeline, enabling pluggable backends (SQLite,
//! in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::models::StoredDocument;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Metadata predicate for store scans. All set fields must match (AND
/// semantics); an empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct MetaFilter {
    pub fragment_id: Option<u64>,
    pub split_id: Option<i64>,
    pub file: Option<String>,
}

impl MetaFilter {
    pub fn fragment(fragment_id: u64) -> Self {
        Self {
            fragment_id: Some(fragment_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_id.is_none() && self.split_id.is_none() && self.file.is_none()
    }

    pub fn matches(&self, doc: &StoredDocument) -> bool {
        if let Some(fragment_id) = self.fragment_id {
            if doc.meta.fragment_id != fragment_id {
                return false;
            }
        }
        if let Some(split_id) = self.split_id {
            if doc.meta.split_id != split_id {
                return false;
            }
        }
        if let Some(ref file) = self.file {
            if &doc.meta.file != file {
                return false;
            }
        }
        true
    }
}

/// Summary counts reported by `quarry describe` and `GET /documents`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub files: i64,
    pub embedded: i64,
}

/// Abstract storage backend for Quarry.
///
/// All operations are async (via `async-trait`); the in-memory
/// implementation returns immediately-ready futures.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert documents. Existing records with the same id are replaced.
    async fn write_documents(&self, docs: &[StoredDocument]) -> Result<()>;

    /// Fetch all documents matching `filter`, in (fragment_id, split_id)
    /// order.
    async fn get_all(&self, filter: &MetaFilter) -> Result<Vec<StoredDocument>>;

    /// Summary counts over the whole store.
    async fn describe(&self) -> Result<StoreStats>;

    /// Full-text keyword search. Returned documents carry a score where
    /// higher is better.
    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<StoredDocument>>;

    /// Cosine-similarity search over stored vectors.
    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<StoredDocument>>;

    /// Ids of documents that do not have an embedding yet.
    async fn documents_missing_embeddings(&self) -> Result<Vec<String>>;

    /// Store embedding vectors for the given document ids.
    async fn store_embeddings(&self, pairs: &[(String, Vec<f32>)]) -> Result<()>;

    /// Remove every document and vector.
    async fn clear(&self) -> Result<()>;
}

/// Supported store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => anyhow::bail!("Unknown store kind: '{}'. Use sqlite or memory.", other),
        }
    }
}

/// Open the backend named by the config.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.kind.parse::<StoreKind>()? {
        StoreKind::Sqlite => Ok(Arc::new(SqliteStore::open(&config.path).await?)),
        StoreKind::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}
