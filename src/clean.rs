//! Composable text-cleaning steps.
//!
//! Each [`CleanStep`] is a transform + filter pair; [`preprocessing_pipeline`]
//! applies an ordered sequence of steps to a list of strings and reports
//! which original positions survived, so callers can re-align parallel
//! structures (id maps) with the cleaned output.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;

use unicode_normalization::UnicodeNormalization;

/// English stopwords, dropped by [`CleanStep::RemoveStopwords`]. Matching is
/// exact (no case folding) against whitespace-delimited tokens.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
    "will", "just", "don", "should", "now",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// A named cleaning step. The set is closed: unrecognized names are a
/// configuration error, never silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanStep {
    CleanWhitespace,
    RemoveStopwords,
    RemoveNumbers,
    RemovePunctuation,
    RemoveBlanklines,
    UnicodeNormalize,
    LowerCase,
}

impl FromStr for CleanStep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean_whitespace" => Ok(CleanStep::CleanWhitespace),
            "remove_stopwords" => Ok(CleanStep::RemoveStopwords),
            "remove_numbers" => Ok(CleanStep::RemoveNumbers),
            "remove_punctuation" => Ok(CleanStep::RemovePunctuation),
            "remove_blanklines" => Ok(CleanStep::RemoveBlanklines),
            "unicode_normalize" => Ok(CleanStep::UnicodeNormalize),
            "lower_case" => Ok(CleanStep::LowerCase),
            other => anyhow::bail!("unknown cleaning step: '{}'", other),
        }
    }
}

impl CleanStep {
    /// Pure rewrite of `text`.
    pub fn transform(&self, text: &str) -> String {
        match self {
            CleanStep::CleanWhitespace => collapse_whitespace(&text.replace('\n', " ")),
            CleanStep::RemoveStopwords => {
                let stops = stop_words();
                text.split_whitespace()
                    .filter(|word| !stops.contains(word))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            CleanStep::RemoveNumbers => text
                .split_whitespace()
                .filter(|word| !word.chars().next().is_some_and(|c| c.is_ascii_digit()))
                .collect::<Vec<_>>()
                .join(" "),
            CleanStep::RemovePunctuation => text
                .chars()
                .filter(|c| !c.is_ascii_punctuation())
                .collect(),
            CleanStep::RemoveBlanklines => text.to_string(),
            CleanStep::UnicodeNormalize => text.nfkd().collect(),
            CleanStep::LowerCase => text.to_lowercase(),
        }
    }

    /// Keep/drop decision, evaluated on the text before this step's
    /// transform.
    pub fn filter(&self, text: &str) -> bool {
        match self {
            CleanStep::RemoveBlanklines => {
                !(text.is_empty() || text.chars().all(char::is_whitespace))
            }
            _ => true,
        }
    }
}

/// Collapse every run of two or more whitespace characters into a single
/// space. Lone whitespace characters are left as they are.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            run.push(c);
        } else {
            flush_whitespace_run(&mut out, &mut run);
            out.push(c);
        }
    }
    flush_whitespace_run(&mut out, &mut run);
    out
}

fn flush_whitespace_run(out: &mut String, run: &mut String) {
    if run.chars().count() >= 2 {
        out.push(' ');
    } else {
        out.push_str(run);
    }
    run.clear();
}

/// Apply `steps` in order to `texts`.
///
/// After each step, elements whose `filter` (on the pre-transform value)
/// returns false are dropped, then `transform` is applied to the survivors.
/// Returns the surviving values together with the original positional
/// indices of every element retained end-to-end.
pub fn preprocessing_pipeline(texts: &[String], steps: &[CleanStep]) -> (Vec<String>, Vec<usize>) {
    let mut kept: Vec<(usize, String)> = texts.iter().cloned().enumerate().collect();
    for step in steps {
        kept = kept
            .into_iter()
            .filter(|(_, text)| step.filter(text))
            .map(|(i, text)| (i, step.transform(&text)))
            .collect();
    }
    kept.into_iter().map(|(i, text)| (text, i)).unzip()
}

/// Parse a list of step names, failing on the first unknown name.
pub fn parse_steps(names: &[&str]) -> anyhow::Result<Vec<CleanStep>> {
    names.iter().map(|name| name.parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn clean_whitespace_collapses_runs() {
        let step = CleanStep::CleanWhitespace;
        assert_eq!(step.transform("a  b\tc"), "a b\tc");
        assert_eq!(step.transform("line\nbreak"), "line break");
        assert_eq!(step.transform("wide \n gap"), "wide gap");
    }

    #[test]
    fn remove_stopwords_keeps_content_words() {
        let step = CleanStep::RemoveStopwords;
        assert_eq!(
            step.transform("the contract shall be awarded to vendors"),
            "contract shall awarded vendors"
        );
    }

    #[test]
    fn remove_numbers_drops_digit_prefixed_tokens() {
        let step = CleanStep::RemoveNumbers;
        assert_eq!(step.transform("clause 14 applies in 2024 always"), "clause applies always");
        // Tokens merely containing digits survive.
        assert_eq!(step.transform("part b2 stays"), "part b2 stays");
    }

    #[test]
    fn remove_punctuation_strips_ascii_punctuation() {
        let step = CleanStep::RemovePunctuation;
        assert_eq!(step.transform("wait, what?! (really)"), "wait what really");
    }

    #[test]
    fn unicode_normalize_is_nfkd() {
        let step = CleanStep::UnicodeNormalize;
        // U+FB01 LATIN SMALL LIGATURE FI decomposes under NFKD.
        assert_eq!(step.transform("\u{fb01}le"), "file");
    }

    #[test]
    fn blanklines_filter_drops_whitespace_only() {
        let step = CleanStep::RemoveBlanklines;
        assert!(!step.filter(""));
        assert!(!step.filter("   \t "));
        assert!(step.filter("text"));
    }

    #[test]
    fn pipeline_reports_retained_indices() {
        let (cleaned, indices) = preprocessing_pipeline(
            &owned(&["a  b", "   ", "c"]),
            &[CleanStep::CleanWhitespace, CleanStep::RemoveBlanklines],
        );
        assert_eq!(cleaned, vec!["a b", "c"]);
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn pipeline_filter_sees_pre_transform_value() {
        // CleanWhitespace turns "  " into " "; RemoveBlanklines in the same
        // position list must still drop it because the filter runs on each
        // step's input, and " " is whitespace-only either way. An entry that
        // becomes blank only after a later transform is dropped by a later
        // blankline step, not retroactively.
        let (cleaned, indices) = preprocessing_pipeline(
            &owned(&["12 34", "keep this"]),
            &[CleanStep::RemoveNumbers, CleanStep::RemoveBlanklines],
        );
        assert_eq!(cleaned, vec!["keep this"]);
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn unknown_step_name_errors() {
        assert!("tokenize".parse::<CleanStep>().is_err());
        assert!(parse_steps(&["clean_whitespace", "bogus"]).is_err());
    }

    #[test]
    fn step_names_round_trip() {
        for name in [
            "clean_whitespace",
            "remove_stopwords",
            "remove_numbers",
            "remove_punctuation",
            "remove_blanklines",
            "unicode_normalize",
            "lower_case",
        ] {
            assert!(name.parse::<CleanStep>().is_ok(), "step {} should parse", name);
        }
    }
}
