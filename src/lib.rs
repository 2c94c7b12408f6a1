//! # Quarry
//!
//! A document search and summarization service. Quarry extracts sentence
//! fragments from HTML, DOCX, and PDF corpora, groups them into context
//! windows, indexes them in SQLite with FTS5 (and optional embeddings),
//! and answers queries through retrieval pipelines that widen each hit
//! back to its surrounding context before summarizing or extracting an
//! answer.
//!
//! The crate is driven by the `quarry` binary:
//!
//! ```bash
//! quarry --config ./config/quarry.toml build
//! quarry --config ./config/quarry.toml search "award criteria"
//! quarry --config ./config/quarry.toml serve
//! ```
//!
//! # Architecture
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`parse`] | Per-format paragraph extraction (HTML, DOCX, PDF) |
//! | [`extract`] | Sentence fragmenting and context grouping |
//! | [`clean`] | Text cleaning pipeline with index realignment |
//! | [`index`] | Metadata enrichment, word splitting, store loading |
//! | [`artifacts`] | Context-group JSON artifacts on disk |
//! | [`store`] | Pluggable document store (SQLite, in-memory) |
//! | [`retrieve`] | Keyword, TF-IDF, and dense retrievers |
//! | [`rank`] | Cross-encoder and overlap re-rankers |
//! | [`enrich`] | Retrieval-time context widening |
//! | [`summarize`] | Local extractive and OpenAI summarizers |
//! | [`pipeline`] | Summarization and QA orchestration |
//! | [`server`] | Axum HTTP API |

pub mod artifacts;
pub mod build;
pub mod clean;
pub mod config;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod extract;
pub mod index;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod rank;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod summarize;
