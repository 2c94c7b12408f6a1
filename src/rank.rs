//! Re-ranking of retrieved documents.
//!
//! The [`Ranker`] trait narrows a candidate list down to the best few.
//! [`CrossEncoderRanker`] posts query/passage pairs to an external scoring
//! service; [`OverlapRanker`] is the local fallback when no endpoint is
//! configured.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RankerConfig;
use crate::models::StoredDocument;

#[async_trait]
pub trait Ranker: Send + Sync {
    /// Re-score `docs` against `query` and return the best `top_k`, best
    /// first, with scores replaced by the ranker's own.
    async fn run(
        &self,
        query: &str,
        docs: Vec<StoredDocument>,
        top_k: usize,
    ) -> Result<Vec<StoredDocument>>;
}

fn sort_and_truncate(mut docs: Vec<StoredDocument>, top_k: usize) -> Vec<StoredDocument> {
    docs.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    docs.truncate(top_k);
    docs
}

/// Cross-encoder scoring over HTTP.
///
/// Posts `{"query": ..., "passages": [...], "model": ...}` to the
/// configured endpoint and expects `{"scores": [f64; passages.len()]}`
/// back, one score per passage in input order.
pub struct CrossEncoderRanker {
    endpoint: String,
    model: Option<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

impl CrossEncoderRanker {
    pub fn new(config: &RankerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ranker.endpoint required for cross-encoder ranker"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint,
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Ranker for CrossEncoderRanker {
    async fn run(
        &self,
        query: &str,
        docs: Vec<StoredDocument>,
        top_k: usize,
    ) -> Result<Vec<StoredDocument>> {
        if docs.is_empty() {
            return Ok(docs);
        }

        let passages: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let body = serde_json::json!({
            "query": query,
            "passages": passages,
            "model": self.model,
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ranker service error {}: {}", status, body_text);
        }

        let parsed: ScoreResponse = response.json().await?;
        if parsed.scores.len() != docs.len() {
            bail!(
                "Ranker returned {} scores for {} passages",
                parsed.scores.len(),
                docs.len()
            );
        }

        let mut scored = docs;
        for (doc, score) in scored.iter_mut().zip(&parsed.scores) {
            doc.score = Some(*score);
        }
        Ok(sort_and_truncate(scored, top_k))
    }
}

/// Local fallback ranker: scores each passage by the fraction of query
/// terms it contains.
pub struct OverlapRanker;

fn terms(text: &str) -> HashSet<String> {
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
impl Ranker for OverlapRanker {
    async fn run(
        &self,
        query: &str,
        docs: Vec<StoredDocument>,
        top_k: usize,
    ) -> Result<Vec<StoredDocument>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(sort_and_truncate(docs, top_k));
        }

        let mut scored = docs;
        for doc in scored.iter_mut() {
            let doc_terms = terms(&doc.content);
            let overlap = query_terms.intersection(&doc_terms).count() as f64;
            doc.score = Some(overlap / query_terms.len() as f64);
        }
        Ok(sort_and_truncate(scored, top_k))
    }
}

/// Cross-encoder when an endpoint is configured, overlap fallback
/// otherwise.
pub fn build_ranker(config: &RankerConfig) -> Result<Box<dyn Ranker>> {
    if config.endpoint.is_some() {
        Ok(Box::new(CrossEncoderRanker::new(config)?))
    } else {
        Ok(Box::new(OverlapRanker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMeta;

    fn doc(id: &str, content: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            content: content.to_string(),
            score: Some(0.5),
            meta: DocMeta::new("test.html", 0),
        }
    }

    #[tokio::test]
    async fn overlap_ranker_orders_by_coverage() {
        let docs = vec![
            doc("a", "contract award process"),
            doc("b", "the award of a contract follows the evaluation process"),
            doc("c", "nothing relevant"),
        ];
        let ranked = OverlapRanker
            .run("contract award evaluation", docs, 2)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "b");
        assert!((ranked[0].score.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(ranked[1].id, "a");
    }

    #[tokio::test]
    async fn overlap_ranker_handles_empty_input() {
        let ranked = OverlapRanker.run("query", Vec::new(), 5).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn fallback_without_endpoint() {
        let config = RankerConfig::default();
        assert!(build_ranker(&config).is_ok());
    }

    #[test]
    fn cross_encoder_requires_endpoint() {
        let config = RankerConfig::default();
        assert!(CrossEncoderRanker::new(&config).is_err());
    }
}
