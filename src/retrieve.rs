//! Retrieval strategies over the document store.
//!
//! Four retrievers share the [`Retriever`] trait: `keyword` delegates to
//! the store's full-text search, `tfidf` scores in memory over the whole
//! corpus, and `embedding`/`dense_passage` embed the query and run vector
//! search. Unknown names are a hard error, never a silent default.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::models::StoredDocument;
use crate::store::{DocumentStore, MetaFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieverKind {
    Keyword,
    TfIdf,
    Embedding,
    DensePassage,
}

impl RetrieverKind {
    pub fn needs_embeddings(&self) -> bool {
        matches!(self, RetrieverKind::Embedding | RetrieverKind::DensePassage)
    }
}

impl FromStr for RetrieverKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(RetrieverKind::Keyword),
            "tfidf" => Ok(RetrieverKind::TfIdf),
            "embedding" => Ok(RetrieverKind::Embedding),
            "dense_passage" => Ok(RetrieverKind::DensePassage),
            other => bail!(
                "Unknown retriever: '{}'. Use keyword, tfidf, embedding, or dense_passage.",
                other
            ),
        }
    }
}

/// A retrieval strategy. Returns at most `top_k` documents, best first,
/// each carrying a score.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn run(&self, query: &str, top_k: usize) -> Result<Vec<StoredDocument>>;
}

impl std::fmt::Debug for dyn Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Retriever")
    }
}

/// Full-text search via the store's keyword index.
pub struct KeywordRetriever {
    store: Arc<dyn DocumentStore>,
}

impl KeywordRetriever {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn run(&self, query: &str, top_k: usize) -> Result<Vec<StoredDocument>> {
        self.store.keyword_search(query, top_k as i64).await
    }
}

/// TF-IDF scoring computed in memory over the whole corpus.
///
/// Fine for corpora that fit in memory; the SQLite keyword retriever is
/// the right choice past that.
pub struct TfIdfRetriever {
    store: Arc<dyn DocumentStore>,
}

impl TfIdfRetriever {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

#[async_trait]
impl Retriever for TfIdfRetriever {
    async fn run(&self, query: &str, top_k: usize) -> Result<Vec<StoredDocument>> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.store.get_all(&MetaFilter::default()).await?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        // Document frequency per query term.
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(&d.content)).collect();
        for terms in &tokenized {
            let unique: HashSet<&str> = terms.iter().map(|t| t.as_str()).collect();
            for term in &query_terms {
                if unique.contains(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let n = docs.len() as f64;
        let mut hits: Vec<StoredDocument> = docs
            .into_iter()
            .zip(tokenized)
            .filter_map(|(doc, terms)| {
                if terms.is_empty() {
                    return None;
                }
                let score: f64 = query_terms
                    .iter()
                    .map(|term| {
                        let tf = terms.iter().filter(|t| *t == term).count() as f64
                            / terms.len() as f64;
                        let df = doc_freq.get(term.as_str()).copied().unwrap_or(0) as f64;
                        let idf = (n / (1.0 + df)).ln() + 1.0;
                        tf * idf
                    })
                    .sum();
                if score > 0.0 {
                    let mut hit = doc;
                    hit.score = Some(score);
                    Some(hit)
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Dense retrieval: embed the query and run vector search.
///
/// `dense_passage` differs from `embedding` only in which model embeds the
/// query; both search the same stored vectors.
pub struct EmbeddingRetriever {
    store: Arc<dyn DocumentStore>,
    provider: EmbeddingProvider,
}

impl EmbeddingRetriever {
    pub fn new(store: Arc<dyn DocumentStore>, provider: EmbeddingProvider) -> Self {
        Self { store, provider }
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    async fn run(&self, query: &str, top_k: usize) -> Result<Vec<StoredDocument>> {
        let query_vec = self.provider.embed_query(query).await?;
        self.store.vector_search(&query_vec, top_k as i64).await
    }
}

/// Build the retriever named by `kind`.
///
/// The dense kinds need an enabled embedding provider; for `dense_passage`
/// the query-side model can be overridden via `query_model`.
pub fn build_retriever(
    kind: RetrieverKind,
    store: Arc<dyn DocumentStore>,
    embedding: &EmbeddingConfig,
    query_model: Option<&str>,
) -> Result<Box<dyn Retriever>> {
    match kind {
        RetrieverKind::Keyword => Ok(Box::new(KeywordRetriever::new(store))),
        RetrieverKind::TfIdf => Ok(Box::new(TfIdfRetriever::new(store))),
        RetrieverKind::Embedding | RetrieverKind::DensePassage => {
            if !embedding.is_enabled() {
                bail!(
                    "Retriever '{:?}' requires embeddings. Set [embedding] provider in config.",
                    kind
                );
            }
            let mut config = embedding.clone();
            if kind == RetrieverKind::DensePassage {
                if let Some(model) = query_model {
                    config.model = Some(model.to_string());
                }
            }
            let provider = EmbeddingProvider::from_config(&config)?;
            Ok(Box::new(EmbeddingRetriever::new(store, provider)))
        }
    }
}
