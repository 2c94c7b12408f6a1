//! Summarization of enriched retrieval results.
//!
//! Two providers behind the [`Summarizer`] trait: `local` is an extractive
//! summarizer that needs no network, `openai` calls the chat completions
//! API with the same retry/backoff discipline as the embedding client.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::SummarizerConfig;
use crate::models::StoredDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizerKind {
    Local,
    OpenAi,
}

impl FromStr for SummarizerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(SummarizerKind::Local),
            "openai" => Ok(SummarizerKind::OpenAi),
            other => bail!("Unknown summarizer: '{}'. Use local or openai.", other),
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce one summary per document, in input order.
    async fn run(&self, docs: &[StoredDocument]) -> Result<Vec<String>>;
}

/// Extractive summarizer: picks the highest-scoring sentences by word
/// frequency, keeping them in document order.
pub struct LocalSummarizer {
    max_sentences: usize,
}

impl LocalSummarizer {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences }
    }

    fn summarize_one(&self, text: &str) -> String {
        let sentences: Vec<&str> = text
            .split('.')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.len() <= self.max_sentences {
            return sentences.join(". ");
        }

        // Frequency of each word across the passage, stopword-free scoring
        // is handled upstream by the cleaning pipeline.
        let mut freq: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for sentence in &sentences {
            for word in sentence.split_whitespace() {
                let word: String = word
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase();
                if !word.is_empty() {
                    *freq.entry(word).or_insert(0) += 1;
                }
            }
        }

        let mut scored: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let words: Vec<String> = sentence
                    .split_whitespace()
                    .map(|w| {
                        w.chars()
                            .filter(|c| c.is_alphanumeric())
                            .collect::<String>()
                            .to_lowercase()
                    })
                    .filter(|w| !w.is_empty())
                    .collect();
                if words.is_empty() {
                    return (i, 0.0);
                }
                let score: f64 = words
                    .iter()
                    .map(|w| freq.get(w).copied().unwrap_or(0) as f64)
                    .sum::<f64>()
                    / words.len() as f64;
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let keep: HashSet<usize> = scored
            .iter()
            .take(self.max_sentences)
            .map(|(i, _)| *i)
            .collect();

        sentences
            .iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, s)| *s)
            .collect::<Vec<_>>()
            .join(". ")
    }
}

#[async_trait]
impl Summarizer for LocalSummarizer {
    async fn run(&self, docs: &[StoredDocument]) -> Result<Vec<String>> {
        Ok(docs
            .iter()
            .map(|doc| {
                let text = doc.meta.extended_content.as_deref().unwrap_or(&doc.content);
                self.summarize_one(text)
            })
            .collect())
    }
}

/// Summarizer backed by the OpenAI chat completions API.
///
/// The API key is checked at construction so a missing credential fails
/// before any retrieval work happens.
pub struct OpenAiSummarizer {
    model: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.model required for OpenAI summarizer"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn summarize_one(&self, text: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Summarize the passage in a few sentences, keeping only the information relevant to its main subject."
                },
                {"role": "user", "content": text},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
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
                        return extract_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Summarization failed after retries")))
    }
}

fn extract_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing completion content"))
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn run(&self, docs: &[StoredDocument]) -> Result<Vec<String>> {
        let mut summaries = Vec::with_capacity(docs.len());
        for doc in docs {
            let text = doc.meta.extended_content.as_deref().unwrap_or(&doc.content);
            summaries.push(self.summarize_one(text).await?);
        }
        Ok(summaries)
    }
}

pub fn build_summarizer(config: &SummarizerConfig) -> Result<Box<dyn Summarizer>> {
    match config.provider.parse::<SummarizerKind>()? {
        SummarizerKind::Local => Ok(Box::new(LocalSummarizer::new(config.max_sentences))),
        SummarizerKind::OpenAi => Ok(Box::new(OpenAiSummarizer::new(config)?)),
    }
}
