//! Metadata enrichment and store loading.
//!
//! Takes the raw fragments from extraction, runs them through the configured
//! cleaning pipeline, threads the prev/next chain over the survivors, splits
//! each fragment into word windows, and writes the resulting documents to
//! the store.
//!
//! The prev/next chain records fragment ids, not positions, so it stays
//! valid after cleaning drops fragments and it spans file boundaries: the
//! last fragment of one file points at the first fragment of the next.

use std::sync::Arc;

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::clean::{preprocessing_pipeline, CleanStep};
use crate::models::{DocMeta, Fragment, StoredDocument};
use crate::store::DocumentStore;

/// Clean fragment texts and thread the prev/next chain.
///
/// Fragments whose text the cleaning pipeline drops entirely are removed;
/// the chain is computed over the survivors, in input order. The first
/// survivor has no `prev` and the last has no `next`.
///
/// Needs at least two fragments, otherwise there is no chain to thread
/// and downstream enrichment cannot work.
pub fn enrich_metadata(fragments: &[Fragment], steps: &[CleanStep]) -> Result<Vec<Fragment>> {
    if fragments.len() < 2 {
        bail!(
            "metadata enrichment needs at least 2 fragments, got {}",
            fragments.len()
        );
    }

    let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
    let (cleaned, indices) = preprocessing_pipeline(&texts, steps);

    let mut enriched: Vec<Fragment> = indices
        .into_iter()
        .zip(cleaned)
        .map(|(i, text)| {
            let mut fragment = fragments[i].clone();
            fragment.text = text;
            fragment
        })
        .collect();

    for i in 0..enriched.len() {
        enriched[i].meta.prev = if i > 0 {
            Some(enriched[i - 1].id)
        } else {
            None
        };
        enriched[i].meta.next = if i + 1 < enriched.len() {
            Some(enriched[i + 1].id)
        } else {
            None
        };
    }

    Ok(enriched)
}

/// Split one fragment into word windows of `split_length` words, each
/// window starting `split_length - split_overlap` words after the previous
/// one. A fragment shorter than one window yields a single document.
///
/// Every window becomes a [`StoredDocument`] carrying the fragment's
/// metadata plus its window index as `split_id`.
pub fn split_fragment(
    fragment: &Fragment,
    split_length: usize,
    split_overlap: usize,
) -> Vec<StoredDocument> {
    let words: Vec<&str> = fragment.text.split_whitespace().collect();
    let stride = split_length - split_overlap;

    let mut docs = Vec::new();
    let mut start = 0usize;
    let mut split_id = 0i64;
    loop {
        let end = (start + split_length).min(words.len());
        let content = words[start..end].join(" ");

        let mut meta = DocMeta::new(fragment.meta.document.clone(), fragment.id);
        meta.prev = fragment.meta.prev;
        meta.next = fragment.meta.next;
        meta.split_id = split_id;

        docs.push(StoredDocument {
            id: Uuid::new_v4().to_string(),
            content,
            score: None,
            meta,
        });

        if end >= words.len() {
            break;
        }
        start += stride;
        split_id += 1;
    }
    docs
}

/// Turn enriched fragments into store documents via the word splitter.
pub fn fragments_to_documents(
    fragments: &[Fragment],
    split_length: usize,
    split_overlap: usize,
) -> Vec<StoredDocument> {
    fragments
        .iter()
        .flat_map(|f| split_fragment(f, split_length, split_overlap))
        .collect()
}

/// Clean, enrich, split, and write the fragments to the store. Returns the
/// number of documents written.
pub async fn index_fragments(
    store: &Arc<dyn DocumentStore>,
    fragments: &[Fragment],
    steps: &[CleanStep],
    split_length: usize,
    split_overlap: usize,
) -> Result<usize> {
    let enriched = enrich_metadata(fragments, steps)?;
    let docs = fragments_to_documents(&enriched, split_length, split_overlap);
    store.write_documents(&docs).await?;
    Ok(docs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn fragment(id: u64, text: &str) -> Fragment {
        Fragment::new(id, text, "test.html")
    }

    const STEPS: &[CleanStep] = &[CleanStep::CleanWhitespace, CleanStep::RemoveBlanklines];

    #[test]
    fn enrichment_requires_two_fragments() {
        let err = enrich_metadata(&[fragment(0, "only one fragment here")], STEPS).unwrap_err();
        assert!(err.to_string().contains("at least 2"), "{err}");
    }

    #[test]
    fn chain_is_threaded_over_survivors() {
        let fragments = vec![
            fragment(0, "first fragment text"),
            fragment(1, "   "),
            fragment(2, "third fragment text"),
            fragment(3, "fourth fragment text"),
        ];
        let enriched = enrich_metadata(&fragments, STEPS).unwrap();

        // Fragment 1 is all whitespace and gets dropped; the chain links
        // 0 -> 2 -> 3 by id.
        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[0].id, 0);
        assert_eq!(enriched[0].meta.prev, None);
        assert_eq!(enriched[0].meta.next, Some(2));
        assert_eq!(enriched[1].id, 2);
        assert_eq!(enriched[1].meta.prev, Some(0));
        assert_eq!(enriched[1].meta.next, Some(3));
        assert_eq!(enriched[2].meta.next, None);
    }

    #[test]
    fn chain_crosses_file_boundaries() {
        let mut a = fragment(0, "last fragment of file a");
        a.meta.document = "a.html".to_string();
        let mut b = fragment(1, "first fragment of file b");
        b.meta.document = "b.html".to_string();

        let enriched = enrich_metadata(&[a, b], STEPS).unwrap();
        assert_eq!(enriched[0].meta.next, Some(1));
        assert_eq!(enriched[1].meta.prev, Some(0));
    }

    #[test]
    fn short_fragment_yields_single_split() {
        let docs = split_fragment(&fragment(0, "just a few words"), 100, 20);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].meta.split_id, 0);
        assert_eq!(docs[0].content, "just a few words");
    }

    #[test]
    fn long_fragment_splits_with_overlap() {
        let words: Vec<String> = (0..10).map(|i| format!("w{i}")).collect();
        let docs = split_fragment(&fragment(0, &words.join(" ")), 4, 2);

        // Windows of 4 words, stride 2: [0..4], [2..6], [4..8], [6..10]
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].content, "w0 w1 w2 w3");
        assert_eq!(docs[1].content, "w2 w3 w4 w5");
        assert_eq!(docs[3].content, "w6 w7 w8 w9");
        let split_ids: Vec<i64> = docs.iter().map(|d| d.meta.split_id).collect();
        assert_eq!(split_ids, [0, 1, 2, 3]);
        for d in &docs {
            assert_eq!(d.meta.fragment_id, 0);
        }
    }

    #[tokio::test]
    async fn index_fragments_writes_to_store() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let fragments = vec![
            fragment(0, "alpha beta gamma delta"),
            fragment(1, "epsilon zeta eta theta"),
        ];
        let written = index_fragments(&store, &fragments, STEPS, 100, 20)
            .await
            .unwrap();
        assert_eq!(written, 2);

        let all = store.get_all(&Default::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].meta.fragment_id, 0);
        assert_eq!(all[0].meta.next, Some(1));
        assert_eq!(all[1].meta.prev, Some(0));
    }
}
