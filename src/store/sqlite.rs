//! SQLite-backed [`DocumentStore`] using sqlx.
//!
//! Documents live in a plain table mirrored into an FTS5 virtual table for
//! keyword search. Embeddings are stored as little-endian f32 blobs and
//! vector search computes cosine similarity in Rust.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{DocMeta, StoredDocument};

use super::{DocumentStore, MetaFilter, StoreStats};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        db::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
    let fragment_id: i64 = row.get("fragment_id");
    let prev: Option<i64> = row.get("prev");
    let next: Option<i64> = row.get("next");
    let mut meta = DocMeta::new(row.get::<String, _>("file"), fragment_id as u64);
    meta.prev = prev.map(|v| v as u64);
    meta.next = next.map(|v| v as u64);
    meta.split_id = row.get("split_id");
    StoredDocument {
        id: row.get("id"),
        content: row.get("content"),
        score: None,
        meta,
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn write_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO documents
                    (id, file, fragment_id, prev, next, split_id, content)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.meta.file)
            .bind(doc.meta.fragment_id as i64)
            .bind(doc.meta.prev.map(|v| v as i64))
            .bind(doc.meta.next.map(|v| v as i64))
            .bind(doc.meta.split_id)
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
                .bind(&doc.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO documents_fts (document_id, content) VALUES (?, ?)")
                .bind(&doc.id)
                .bind(&doc.content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_all(&self, filter: &MetaFilter) -> Result<Vec<StoredDocument>> {
        let mut sql = String::from(
            "SELECT id, file, fragment_id, prev, next, split_id, content FROM documents",
        );
        let mut clauses = Vec::new();
        if filter.fragment_id.is_some() {
            clauses.push("fragment_id = ?");
        }
        if filter.split_id.is_some() {
            clauses.push("split_id = ?");
        }
        if filter.file.is_some() {
            clauses.push("file = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY fragment_id, split_id");

        let mut query = sqlx::query(&sql);
        if let Some(fragment_id) = filter.fragment_id {
            query = query.bind(fragment_id as i64);
        }
        if let Some(split_id) = filter.split_id {
            query = query.bind(split_id);
        }
        if let Some(ref file) = filter.file {
            query = query.bind(file);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn describe(&self) -> Result<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let files: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT file) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            documents,
            files,
            embedded,
        })
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<StoredDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.file, d.fragment_id, d.prev, d.next, d.split_id, d.content,
                   documents_fts.rank AS rank
            FROM documents_fts
            JOIN documents d ON d.id = documents_fts.document_id
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts_escape(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                let mut doc = row_to_document(row);
                doc.score = Some(-rank); // negate so higher = better
                doc
            })
            .collect())
    }

    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<StoredDocument>> {
        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.file, d.fragment_id, d.prev, d.next, d.split_id, d.content,
                   v.embedding
            FROM document_vectors v
            JOIN documents d ON d.id = v.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<StoredDocument> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let mut doc = row_to_document(row);
                doc.score = Some(cosine_similarity(query_vec, &vec) as f64);
                doc
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn documents_missing_embeddings(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id
            FROM documents d
            LEFT JOIN document_vectors v ON v.document_id = d.id
            WHERE v.document_id IS NULL
            ORDER BY d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn store_embeddings(&self, pairs: &[(String, Vec<f32>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, vec) in pairs {
            sqlx::query(
                "INSERT OR REPLACE INTO document_vectors (document_id, embedding, dims) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(vec_to_blob(vec))
            .bind(vec.len() as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM document_vectors")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM documents_fts")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Quote each term so FTS5 operators in user queries are treated literally.
fn fts_escape(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
