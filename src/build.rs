//! Corpus build orchestration.
//!
//! `quarry build` runs extraction, artifact writing, metadata enrichment,
//! and store loading as one pass. The store and artifacts are rebuilt
//! wholesale each run; there is no incremental indexing.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::artifacts;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::extract::FragmentExtractor;
use crate::index;
use crate::parse::FileParser;
use crate::retrieve::RetrieverKind;
use crate::store::{self, DocumentStore, MetaFilter};

/// Counts reported by one build run.
#[derive(Debug)]
pub struct BuildReport {
    pub files: usize,
    pub fragments: usize,
    pub documents: usize,
    pub embedded: usize,
}

/// Run a full corpus build: extract, write artifacts, enrich, index, and
/// (when configured) embed.
pub async fn run_build(config: &Config, index_name: &str) -> Result<BuildReport> {
    let store = store::open_store(&config.store).await?;
    run_build_with_store(config, index_name, &store).await
}

/// [`run_build`] against an already-open store. The server uses this so a
/// rebuild lands in the store its pipelines search.
pub async fn run_build_with_store(
    config: &Config,
    index_name: &str,
    store: &Arc<dyn DocumentStore>,
) -> Result<BuildReport> {
    let mut extractor = FragmentExtractor::new(
        FileParser::default(),
        config.extraction.min_char_length,
        config.extraction.context_length,
    );
    extractor
        .load_dir(&config.extraction.source_dir)
        .with_context(|| {
            format!(
                "failed to extract from {}",
                config.extraction.source_dir.display()
            )
        })?;

    let (fragments, context, fragment_to_context) = extractor.into_parts();
    if fragments.is_empty() {
        bail!(
            "no fragments extracted from {}",
            config.extraction.source_dir.display()
        );
    }
    // Checked before any write so an undersized corpus cannot clobber the
    // artifacts and store of a previous good build.
    if fragments.len() < 2 {
        bail!(
            "only {} fragment extracted from {}; an index needs at least 2",
            fragments.len(),
            config.extraction.source_dir.display()
        );
    }
    let files: std::collections::HashSet<&str> = fragments
        .iter()
        .map(|f| f.meta.document.as_str())
        .collect();

    artifacts::write_artifacts(
        &config.extraction.artifact_dir,
        index_name,
        &context,
        &fragment_to_context,
    )?;

    let steps = crate::clean::parse_steps(
        &config
            .pipeline
            .cleaning_steps
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>(),
    )?;

    store.clear().await?;
    let documents = index::index_fragments(
        &store,
        &fragments,
        &steps,
        config.extraction.split_length,
        config.extraction.split_overlap,
    )
    .await?;

    // Embed everything the store is missing, in batches. Only runs when
    // the configured retriever actually searches by vector.
    let retriever_kind: RetrieverKind = config.pipeline.retriever.parse()?;
    let mut embedded = 0usize;
    if retriever_kind.needs_embeddings() && config.embedding.is_enabled() {
        let provider = EmbeddingProvider::from_config(&config.embedding)?;
        let missing = store.documents_missing_embeddings().await?;
        let by_id: std::collections::HashMap<String, String> = store
            .get_all(&MetaFilter::default())
            .await?
            .into_iter()
            .map(|d| (d.id, d.content))
            .collect();
        for batch_ids in missing.chunks(config.embedding.batch_size.max(1)) {
            let batch: Vec<(String, String)> = batch_ids
                .iter()
                .filter_map(|id| by_id.get(id).map(|text| (id.clone(), text.clone())))
                .collect();
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = provider.embed_texts(&texts).await?;
            let pairs: Vec<(String, Vec<f32>)> = batch
                .into_iter()
                .map(|(id, _)| id)
                .zip(vectors)
                .collect();
            embedded += pairs.len();
            store.store_embeddings(&pairs).await?;
        }
    }

    Ok(BuildReport {
        files: files.len(),
        fragments: fragments.len(),
        documents,
        embedded,
    })
}

/// Print a build report the way the CLI expects it.
pub fn print_report(report: &BuildReport, index_name: &str) {
    println!("Build complete for index '{}':", index_name);
    println!("  files:     {}", report.files);
    println!("  fragments: {}", report.fragments);
    println!("  documents: {}", report.documents);
    if report.embedded > 0 {
        println!("  embedded:  {}", report.embedded);
    }
}
