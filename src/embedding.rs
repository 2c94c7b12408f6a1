//! Embedding provider for dense retrieval.
//!
//! Supports two providers:
//! - `disabled` — no vectors are produced; dense retrieval is unavailable.
//! - `openai` — calls the OpenAI embeddings API with batching, retry, and
//!   exponential backoff (1s, 2s, 4s, ... capped at 32s). HTTP 429 and 5xx
//!   responses retry; other 4xx responses fail immediately.
//!
//! Also holds the vector utilities shared with the stores: [`vec_to_blob`]
//! and [`blob_to_vec`] for little-endian f32 BLOB storage, and
//! [`cosine_similarity`].

use std::time::Duration;

use anyhow::{bail, Result};

use crate::config::EmbeddingConfig;

pub enum EmbeddingProvider {
    Disabled,
    OpenAi {
        model: String,
        dims: usize,
        batch_size: usize,
        max_retries: u32,
        timeout_secs: u64,
    },
}

impl EmbeddingProvider {
    /// Build a provider from the config.
    ///
    /// For the OpenAI provider this checks `OPENAI_API_KEY` up front so a
    /// missing credential fails at construction, not mid-run.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider.as_str() {
            "disabled" => Ok(EmbeddingProvider::Disabled),
            "openai" => {
                let model = config
                    .model
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
                let dims = config
                    .dims
                    .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
                if std::env::var("OPENAI_API_KEY").is_err() {
                    bail!("OPENAI_API_KEY environment variable not set");
                }
                Ok(EmbeddingProvider::OpenAi {
                    model,
                    dims,
                    batch_size: config.batch_size,
                    max_retries: config.max_retries,
                    timeout_secs: config.timeout_secs,
                })
            }
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, EmbeddingProvider::Disabled)
    }

    pub fn dims(&self) -> usize {
        match self {
            EmbeddingProvider::Disabled => 0,
            EmbeddingProvider::OpenAi { dims, .. } => *dims,
        }
    }

    /// Embed a batch of texts, in input order. Batches larger than the
    /// configured batch size are split into multiple API calls.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbeddingProvider::Disabled => bail!("Embedding provider is disabled"),
            EmbeddingProvider::OpenAi {
                model,
                batch_size,
                max_retries,
                timeout_secs,
                ..
            } => {
                let mut all = Vec::with_capacity(texts.len());
                for batch in texts.chunks((*batch_size).max(1)) {
                    let vecs =
                        embed_openai_batch(model, batch, *max_retries, *timeout_secs).await?;
                    all.extend(vecs);
                }
                Ok(all)
            }
        }
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Call the OpenAI embeddings API once per batch with retry/backoff.
async fn embed_openai_batch(
    model: &str,
    texts: &[String],
    max_retries: u32,
    timeout_secs: u64,
) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err =
                        Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn disabled_provider_refuses_to_embed() {
        let provider = EmbeddingProvider::Disabled;
        assert!(!provider.is_enabled());
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(provider.embed_texts(&["x".to_string()]))
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn parse_response_extracts_vectors_in_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 2.0]},
                {"index": 1, "embedding": [3.0, 4.0]},
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }
}
