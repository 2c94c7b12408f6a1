//! In-memory [`DocumentStore`] implementation for tests.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Keyword
//! search is a naive term-frequency scan; vector search is brute-force
//! cosine similarity over all stored vectors.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::StoredDocument;

use super::{DocumentStore, MetaFilter, StoreStats};

/// In-memory store for tests and throwaway runs.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, StoredDocument>>,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            vectors: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_by_position(docs: &mut [StoredDocument]) {
    docs.sort_by(|a, b| {
        a.meta
            .fragment_id
            .cmp(&b.meta.fragment_id)
            .then(a.meta.split_id.cmp(&b.meta.split_id))
    });
}

fn sort_by_score(docs: &mut [StoredDocument]) {
    docs.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn write_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        let mut stored = self.docs.write().unwrap();
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn get_all(&self, filter: &MetaFilter) -> Result<Vec<StoredDocument>> {
        let stored = self.docs.read().unwrap();
        let mut docs: Vec<StoredDocument> = stored
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        sort_by_position(&mut docs);
        Ok(docs)
    }

    async fn describe(&self) -> Result<StoreStats> {
        let stored = self.docs.read().unwrap();
        let files: HashSet<&str> = stored.values().map(|d| d.meta.file.as_str()).collect();
        let embedded = self.vectors.read().unwrap().len() as i64;
        Ok(StoreStats {
            documents: stored.len() as i64,
            files: files.len() as i64,
            embedded,
        })
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<StoredDocument>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.docs.read().unwrap();
        let mut hits: Vec<StoredDocument> = stored
            .values()
            .filter_map(|doc| {
                let content = doc.content.to_lowercase();
                let score: f64 = terms
                    .iter()
                    .map(|t| content.matches(t.as_str()).count() as f64)
                    .sum();
                if score > 0.0 {
                    let mut hit = doc.clone();
                    hit.score = Some(score);
                    Some(hit)
                } else {
                    None
                }
            })
            .collect();
        sort_by_score(&mut hits);
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<StoredDocument>> {
        let vectors = self.vectors.read().unwrap();
        let stored = self.docs.read().unwrap();
        let mut hits: Vec<StoredDocument> = vectors
            .iter()
            .filter_map(|(id, vec)| {
                stored.get(id).map(|doc| {
                    let mut hit = doc.clone();
                    hit.score = Some(cosine_similarity(query_vec, vec) as f64);
                    hit
                })
            })
            .collect();
        sort_by_score(&mut hits);
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn documents_missing_embeddings(&self) -> Result<Vec<String>> {
        let stored = self.docs.read().unwrap();
        let vectors = self.vectors.read().unwrap();
        let mut missing: Vec<String> = stored
            .keys()
            .filter(|id| !vectors.contains_key(*id))
            .cloned()
            .collect();
        missing.sort();
        Ok(missing)
    }

    async fn store_embeddings(&self, pairs: &[(String, Vec<f32>)]) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        for (id, vec) in pairs {
            vectors.insert(id.clone(), vec.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.docs.write().unwrap().clear();
        self.vectors.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMeta;

    fn doc(id: &str, fragment_id: u64, split_id: i64, content: &str) -> StoredDocument {
        let mut meta = DocMeta::new("test.html", fragment_id);
        meta.split_id = split_id;
        StoredDocument {
            id: id.to_string(),
            content: content.to_string(),
            score: None,
            meta,
        }
    }

    #[tokio::test]
    async fn get_all_is_ordered_by_position() {
        let store = InMemoryStore::new();
        store
            .write_documents(&[
                doc("c", 1, 1, "third"),
                doc("a", 0, 0, "first"),
                doc("b", 1, 0, "second"),
            ])
            .await
            .unwrap();

        let all = store.get_all(&MetaFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_term_frequency() {
        let store = InMemoryStore::new();
        store
            .write_documents(&[
                doc("a", 0, 0, "acquisition strategy"),
                doc("b", 1, 0, "acquisition acquisition process"),
                doc("c", 2, 0, "unrelated text"),
            ])
            .await
            .unwrap();

        let hits = store.keyword_search("acquisition", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
    }

    #[tokio::test]
    async fn embeddings_tracking() {
        let store = InMemoryStore::new();
        store
            .write_documents(&[doc("a", 0, 0, "x"), doc("b", 1, 0, "y")])
            .await
            .unwrap();

        assert_eq!(
            store.documents_missing_embeddings().await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        store
            .store_embeddings(&[("a".to_string(), vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(
            store.documents_missing_embeddings().await.unwrap(),
            vec!["b".to_string()]
        );

        let hits = store.vector_search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
