//! Retrieval-time enrichment.
//!
//! A retrieved document is a single word window, often too little context
//! to summarize well. The enricher widens each hit with the section that
//! follows it: first the next window of the same fragment, and when the
//! fragment has no further window, the first window of the next fragment
//! in the chain. The merged text replaces the content while the hit's
//! original score and metadata are kept.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::models::{merge_documents, StoredDocument};
use crate::store::{DocumentStore, MetaFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichMode {
    None,
    NextDocument,
}

impl FromStr for EnrichMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(EnrichMode::None),
            "next_document" => Ok(EnrichMode::NextDocument),
            other => bail!("Unknown enricher: '{}'. Use none or next_document.", other),
        }
    }
}

pub struct RetrievalEnricher {
    store: Arc<dyn DocumentStore>,
    mode: EnrichMode,
}

impl RetrievalEnricher {
    pub fn new(store: Arc<dyn DocumentStore>, mode: EnrichMode) -> Self {
        Self { store, mode }
    }

    /// The section following `doc`: the next split of the same fragment if
    /// one exists, otherwise split 0 of the fragment `doc.meta.next` points
    /// at. `None` when the document is the end of the chain.
    async fn find_next_section(&self, doc: &StoredDocument) -> Result<Option<StoredDocument>> {
        let same_fragment = MetaFilter {
            fragment_id: Some(doc.meta.fragment_id),
            split_id: Some(doc.meta.split_id + 1),
            file: None,
        };
        let mut hits = self.store.get_all(&same_fragment).await?;
        if let Some(next) = hits.pop() {
            return Ok(Some(next));
        }

        let Some(next_fragment) = doc.meta.next else {
            return Ok(None);
        };
        let next_filter = MetaFilter {
            fragment_id: Some(next_fragment),
            split_id: Some(0),
            file: None,
        };
        let mut hits = self.store.get_all(&next_filter).await?;
        Ok(hits.pop())
    }

    /// Widen each retrieved document in place. Score and metadata of the
    /// original hit survive the merge; only the content grows.
    pub async fn run(&self, docs: Vec<StoredDocument>) -> Result<Vec<StoredDocument>> {
        if self.mode == EnrichMode::None {
            return Ok(docs);
        }

        let mut enriched = Vec::with_capacity(docs.len());
        for doc in docs {
            match self.find_next_section(&doc).await? {
                Some(next) => {
                    let merged = merge_documents(&[doc.clone(), next]);
                    enriched.push(StoredDocument {
                        id: doc.id,
                        content: merged.content,
                        score: doc.score,
                        meta: doc.meta,
                    });
                }
                None => enriched.push(doc),
            }
        }
        Ok(enriched)
    }
}
