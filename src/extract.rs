//! Fragment extraction and context grouping.
//!
//! Walks a source directory in lexicographic path order, parses every
//! supported file into paragraphs, splits the paragraphs into [`Fragment`]s,
//! and builds the per-file context-group index that the summarization
//! pipeline later uses to recover extended passages for retrieved hits.
//!
//! Fragment ids are run-scoped and monotonic: they keep increasing across
//! file boundaries, so the prev/next chain built downstream spans the whole
//! extraction run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::clean::{preprocessing_pipeline, CleanStep};
use crate::models::Fragment;
use crate::parse::FileParser;

/// Default minimum character length of a fragment.
pub const DEFAULT_MIN_CHAR_LENGTH: usize = 60;
/// Default number of fragments per context group.
pub const DEFAULT_CONTEXT_LENGTH: usize = 4;

/// Cleaning applied to the context-group text before it is persisted.
const CONTEXT_CLEANING: &[CleanStep] = &[
    CleanStep::UnicodeNormalize,
    CleanStep::CleanWhitespace,
    CleanStep::RemoveBlanklines,
];

/// One extraction pass over a source directory.
///
/// All fragments and the context-group maps accumulate on the extractor;
/// [`FragmentExtractor::load_dir`] drives the whole pass.
pub struct FragmentExtractor {
    parser: FileParser,
    min_char_length: usize,
    context_length: usize,
    next_id: u64,
    fragments: Vec<Fragment>,
    context: HashMap<String, String>,
    fragment_to_context: HashMap<u64, String>,
}

impl FragmentExtractor {
    pub fn new(parser: FileParser, min_char_length: usize, context_length: usize) -> Self {
        Self {
            parser,
            min_char_length,
            context_length,
            next_id: 0,
            fragments: Vec::new(),
            context: HashMap::new(),
            fragment_to_context: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            FileParser::default(),
            DEFAULT_MIN_CHAR_LENGTH,
            DEFAULT_CONTEXT_LENGTH,
        )
    }

    /// Extract every supported file under `dir`, in lexicographic path
    /// order. A parse failure on any file aborts the run.
    pub fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let files = collect_source_files(dir)?;
        for file in &files {
            let paragraphs = self
                .parser
                .parse_file(file)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            let fragments = self.generate_fragments(file, &paragraphs);
            self.group_fragments(&fragments);
            self.fragments.extend(fragments);
        }
        self.clean_context();
        Ok(())
    }

    /// Split one file's paragraphs into fragments and assign run-scoped ids.
    ///
    /// All paragraphs are concatenated, split on the literal period, and the
    /// pieces (each re-suffixed with a period) greedily re-accumulated into a
    /// buffer that is flushed once it reaches `min_char_length` characters
    /// and contains at least one space. A trailing partial buffer at
    /// end-of-file is dropped, not flushed.
    pub fn generate_fragments(&mut self, file: &Path, paragraphs: &[String]) -> Vec<Fragment> {
        let document = file.display().to_string();
        let joined = paragraphs.concat();
        let mut fragments = Vec::new();
        let mut buffer = String::new();
        for piece in joined.split('.') {
            buffer.push_str(piece);
            buffer.push('.');
            if buffer.chars().count() >= self.min_char_length && buffer.contains(' ') {
                let id = self.next_id;
                self.next_id += 1;
                fragments.push(Fragment::new(id, std::mem::take(&mut buffer), &document));
            }
        }
        fragments
    }

    /// Group one file's fragments into context windows of `context_length`
    /// fragments each.
    ///
    /// The final window of a file absorbs any undersized remainder instead
    /// of closing early, so it holds between 1 and 2×`context_length`
    /// fragments and no fragment is ever left without a group. Groups never
    /// cross file boundaries because grouping runs once per file.
    pub fn group_fragments(&mut self, fragments: &[Fragment]) {
        if fragments.is_empty() {
            return;
        }
        let mut counter = 0usize;
        let mut group_id = Uuid::new_v4().to_string();
        let mut current = String::new();
        for (i, fragment) in fragments.iter().enumerate() {
            if counter >= self.context_length && i < fragments.len() - 1 {
                self.context.insert(group_id.clone(), std::mem::take(&mut current));
                group_id = Uuid::new_v4().to_string();
                counter = 0;
            }
            self.fragment_to_context.insert(fragment.id, group_id.clone());
            current.push_str(&fragment.text);
            counter += 1;
        }
        self.context.insert(group_id, current);
    }

    /// Run the persisted context text through the cleaning pipeline,
    /// re-aligning group ids with the surviving entries. The fragment→context
    /// index is left untouched — it indexes stable fragment ids.
    fn clean_context(&mut self) {
        let (keys, values): (Vec<String>, Vec<String>) = self.context.drain().unzip();
        let (cleaned, indices) = preprocessing_pipeline(&values, CONTEXT_CLEANING);
        self.context = indices
            .into_iter()
            .zip(cleaned)
            .map(|(i, text)| (keys[i].clone(), text))
            .collect();
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_parts(self) -> (Vec<Fragment>, HashMap<String, String>, HashMap<u64, String>) {
        (self.fragments, self.context, self.fragment_to_context)
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn fragment_to_context(&self) -> &HashMap<u64, String> {
        &self.fragment_to_context
    }
}

/// Collect supported files under `dir`, sorted lexicographically by path.
fn collect_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() && FileParser::supports(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{FormatParser, ParseError};

    /// Fake parser returning a fixed paragraph list regardless of bytes.
    struct FixedParser(Vec<String>);

    impl FormatParser for FixedParser {
        fn parse(&self, _bytes: &[u8]) -> Result<Vec<String>, ParseError> {
            Ok(self.0.clone())
        }
    }

    fn extractor(min_char_length: usize, context_length: usize) -> FragmentExtractor {
        FragmentExtractor::new(FileParser::default(), min_char_length, context_length)
    }

    fn sample_fragments(texts: &[&str]) -> Vec<Fragment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Fragment::new(i as u64, *t, "test.html"))
            .collect()
    }

    #[test]
    fn fragments_meet_minimum_length_and_contain_space() {
        let mut ex = extractor(60, 4);
        let paragraphs = vec![
            "The acquisition process shall deliver on a timely basis the best value product.".to_string(),
            "Participants in the acquisition process should work together as a team. \
             They should be empowered to make decisions within their area of responsibility."
                .to_string(),
        ];
        let fragments = ex.generate_fragments(Path::new("a.html"), &paragraphs);
        assert!(!fragments.is_empty());
        for f in &fragments {
            assert!(f.text.len() >= 60, "fragment too short: {:?}", f.text);
            assert!(f.text.contains(' '));
        }
    }

    #[test]
    fn trailing_partial_buffer_is_dropped() {
        let mut ex = extractor(60, 4);
        let paragraphs = vec![
            "A first sentence that is long enough to pass the sixty character minimum easily. tail without period"
                .to_string(),
        ];
        let fragments = ex.generate_fragments(Path::new("a.html"), &paragraphs);
        assert_eq!(fragments.len(), 1);
        assert!(!fragments[0].text.contains("tail"));
    }

    #[test]
    fn minimum_length_counts_characters_not_bytes() {
        let mut ex = extractor(40, 4);
        // 30 characters (60 bytes in UTF-8): under the threshold, so the
        // buffer keeps accumulating into the next sentence.
        let multibyte = "é".repeat(28) + " é";
        assert_eq!(multibyte.chars().count(), 30);
        assert!(multibyte.len() >= 40);
        let paragraphs = vec![format!("{multibyte}. and a short ascii continuation.")];
        let fragments = ex.generate_fragments(Path::new("a.html"), &paragraphs);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].text.contains("continuation"));
    }

    #[test]
    fn ids_are_monotonic_across_files() {
        let mut ex = extractor(10, 4);
        let paragraphs =
            vec!["one short sentence here. another short sentence here.".to_string()];
        let first = ex.generate_fragments(Path::new("a.html"), &paragraphs);
        let second = ex.generate_fragments(Path::new("b.html"), &paragraphs);
        let last_of_first = first.last().unwrap().id;
        assert_eq!(second.first().unwrap().id, last_of_first + 1);
        assert_eq!(second[0].meta.document, "b.html");
    }

    #[test]
    fn grouping_splits_exactly_at_boundary() {
        let mut ex = extractor(60, 2);
        let fragments = sample_fragments(&[
            "First Sentence.",
            "Second Sentence.",
            "Third Sentence.",
            "Fourth Sentence.",
        ]);
        ex.group_fragments(&fragments);

        assert_eq!(ex.context.len(), 2);
        let first_group = &ex.fragment_to_context[&0];
        let second_group = &ex.fragment_to_context[&2];
        assert_eq!(&ex.fragment_to_context[&1], first_group);
        assert_eq!(&ex.fragment_to_context[&3], second_group);
        assert_ne!(first_group, second_group);
        assert_eq!(ex.context[first_group], "First Sentence.Second Sentence.");
        assert_eq!(ex.context[second_group], "Third Sentence.Fourth Sentence.");
    }

    #[test]
    fn final_group_absorbs_undersized_remainder() {
        let mut ex = extractor(60, 3);
        let fragments = sample_fragments(&[
            "First Sentence.",
            "Second Sentence.",
            "Third Sentence.",
            "Fourth Sentence.",
        ]);
        ex.group_fragments(&fragments);

        assert_eq!(ex.context.len(), 1, "k+1 fragments must yield one group");
        let group = &ex.fragment_to_context[&0];
        assert_eq!(
            ex.context[group],
            "First Sentence.Second Sentence.Third Sentence.Fourth Sentence."
        );
    }

    #[test]
    fn every_fragment_mapped_exactly_once() {
        let mut ex = extractor(60, 4);
        let texts: Vec<String> = (0..11).map(|i| format!("Sentence number {}.", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let fragments = sample_fragments(&refs);
        ex.group_fragments(&fragments);

        assert_eq!(ex.fragment_to_context.len(), fragments.len());
        // Concatenating each group's members in id order reproduces the
        // stored group text.
        for (group_id, text) in &ex.context {
            let mut members: Vec<&Fragment> = fragments
                .iter()
                .filter(|f| &ex.fragment_to_context[&f.id] == group_id)
                .collect();
            members.sort_by_key(|f| f.id);
            let rebuilt: String = members.iter().map(|f| f.text.as_str()).collect();
            assert_eq!(&rebuilt, text);
        }
    }

    #[test]
    fn load_dir_walks_sorted_and_cleans_context() {
        use std::fs;
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(
            tmp.path().join("b.html"),
            "<p>Beta file sentence that is certainly long enough to index properly.</p>",
        )
        .unwrap();
        fs::write(
            tmp.path().join("a.html"),
            "<p>Alpha file sentence that is certainly long enough to index properly.</p>",
        )
        .unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored entirely").unwrap();

        let mut ex = FragmentExtractor::with_defaults();
        ex.load_dir(tmp.path()).unwrap();

        let fragments = ex.fragments();
        assert_eq!(fragments.len(), 2);
        // Lexicographic order: a.html before b.html.
        assert!(fragments[0].meta.document.ends_with("a.html"));
        assert!(fragments[1].meta.document.ends_with("b.html"));
        assert_eq!(fragments[0].id, 0);
        assert_eq!(fragments[1].id, 1);
        assert_eq!(ex.context().len(), 2);
    }

    #[test]
    fn fake_parser_is_injectable() {
        let parser = FileParser::new(
            Box::new(FixedParser(vec![
                "An injected paragraph that is long enough to become a fragment on its own."
                    .to_string(),
            ])),
            Box::new(FixedParser(vec![])),
            Box::new(FixedParser(vec![])),
        );
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.html"), "<ignored>").unwrap();

        let mut ex = FragmentExtractor::new(parser, 60, 4);
        ex.load_dir(tmp.path()).unwrap();
        assert_eq!(ex.fragments().len(), 1);
        assert!(ex.fragments()[0].text.starts_with("An injected paragraph"));
    }
}
