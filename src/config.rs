use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::clean::CleanStep;
use crate::enrich::EnrichMode;
use crate::retrieve::RetrieverKind;
use crate::store::StoreKind;
use crate::summarize::SummarizerKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: String,
    pub path: PathBuf,
}

fn default_store_kind() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub source_dir: PathBuf,
    pub artifact_dir: PathBuf,
    #[serde(default = "default_min_char_length")]
    pub min_char_length: usize,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    #[serde(default = "default_split_length")]
    pub split_length: usize,
    #[serde(default = "default_split_overlap")]
    pub split_overlap: usize,
}

fn default_min_char_length() -> usize {
    60
}
fn default_context_length() -> usize {
    4
}
fn default_split_length() -> usize {
    100
}
fn default_split_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_index_name")]
    pub index: String,
    #[serde(default = "default_retriever")]
    pub retriever: String,
    #[serde(default = "default_enricher")]
    pub enricher: String,
    #[serde(default = "default_top_k_retrieve")]
    pub top_k_retrieve: usize,
    #[serde(default = "default_top_k_rank")]
    pub top_k_rank: usize,
    #[serde(default = "default_cleaning_steps")]
    pub cleaning_steps: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index: default_index_name(),
            retriever: default_retriever(),
            enricher: default_enricher(),
            top_k_retrieve: default_top_k_retrieve(),
            top_k_rank: default_top_k_rank(),
            cleaning_steps: default_cleaning_steps(),
        }
    }
}

fn default_index_name() -> String {
    "corpus".to_string()
}
fn default_retriever() -> String {
    "keyword".to_string()
}
fn default_enricher() -> String {
    "next_document".to_string()
}
fn default_top_k_retrieve() -> usize {
    10
}
fn default_top_k_rank() -> usize {
    5
}
fn default_cleaning_steps() -> Vec<String> {
    vec![
        "unicode_normalize".to_string(),
        "clean_whitespace".to_string(),
        "lower_case".to_string(),
        "remove_blanklines".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankerConfig {
    /// HTTP endpoint of a cross-encoder scoring service. When unset the
    /// local overlap ranker is used.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_summarizer_provider(),
            model: None,
            max_sentences: default_max_sentences(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_summarizer_provider() -> String {
    "local".to_string()
}
fn default_max_sentences() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate store
    config.store.kind.parse::<StoreKind>()?;

    // Validate extraction
    if config.extraction.min_char_length == 0 {
        anyhow::bail!("extraction.min_char_length must be > 0");
    }
    if config.extraction.context_length == 0 {
        anyhow::bail!("extraction.context_length must be > 0");
    }
    if config.extraction.split_length == 0 {
        anyhow::bail!("extraction.split_length must be > 0");
    }
    if config.extraction.split_overlap >= config.extraction.split_length {
        anyhow::bail!("extraction.split_overlap must be < extraction.split_length");
    }

    // Validate pipeline
    config.pipeline.retriever.parse::<RetrieverKind>()?;
    config.pipeline.enricher.parse::<EnrichMode>()?;
    for step in &config.pipeline.cleaning_steps {
        step.parse::<CleanStep>()?;
    }
    if config.pipeline.top_k_retrieve == 0 {
        anyhow::bail!("pipeline.top_k_retrieve must be >= 1");
    }

    // Validate summarizer
    config.summarizer.provider.parse::<SummarizerKind>()?;

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
