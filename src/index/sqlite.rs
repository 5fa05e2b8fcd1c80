//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs alongside the chunk
//! text and metadata, one row per `chunk_id`. Similarity search filters
//! eligible rows by `source_type` in SQL, then scores the full eligible
//! set with brute-force cosine in Rust — the filter constrains the
//! candidate set, it is never applied after truncation.
//!
//! An `index_meta` row pins the embedding model, dimension, and metric at
//! provisioning time so a later configuration change cannot silently mix
//! vector spaces.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, DocMeta, IndexedChunk, RetrievedResult, SourceType};

use super::{rank_results, IndexStats, VectorIndex};

/// Distance metric recorded in `index_meta`. Only cosine is supported;
/// the value exists so a future metric change is an explicit migration.
const METRIC: &str = "cosine";

pub struct SqliteIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, model: &str, dims: usize) -> Self {
        Self {
            pool,
            model: model.to_string(),
            dims,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_schema(&self) -> Result<()> {
        // Explicit existence check rather than create-and-ignore-errors,
        // so real provisioning failures still surface.
        let provisioned: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'index_meta'",
        )
        .fetch_optional(&self.pool)
        .await?;

        if provisioned.is_some() {
            let (model, dims, _metric): (String, i64, String) =
                sqlx::query_as("SELECT model, dims, metric FROM index_meta WHERE id = 1")
                    .fetch_one(&self.pool)
                    .await?;
            if dims as usize != self.dims {
                return Err(PipelineError::DimensionMismatch {
                    expected: dims as usize,
                    actual: self.dims,
                });
            }
            if model != self.model {
                return Err(PipelineError::IndexUnavailable(format!(
                    "index was provisioned for model '{model}', configured model is '{}'",
                    self.model
                )));
            }
            return Ok(());
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                metric TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indexed_chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_source_type ON indexed_chunks (source_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON indexed_chunks (document_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT INTO index_meta (id, model, dims, metric) VALUES (1, ?, ?, ?)")
            .bind(&self.model)
            .bind(self.dims as i64)
            .bind(METRIC)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        for ic in chunks {
            if ic.vector.len() != self.dims {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.dims,
                    actual: ic.vector.len(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;

        for ic in chunks {
            let metadata_json = serde_json::to_string(&ic.chunk.meta).map_err(|e| {
                PipelineError::IndexUnavailable(format!("metadata serialization failed: {e}"))
            })?;

            sqlx::query(
                r#"
                INSERT INTO indexed_chunks
                    (chunk_id, document_id, chunk_index, text, source_type, source_url, title, metadata_json, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    source_type = excluded.source_type,
                    source_url = excluded.source_url,
                    title = excluded.title,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&ic.chunk.chunk_id)
            .bind(&ic.chunk.document_id)
            .bind(ic.chunk.chunk_index)
            .bind(&ic.chunk.text)
            .bind(ic.chunk.meta.source_type().as_str())
            .bind(&ic.chunk.meta.source_url)
            .bind(&ic.chunk.meta.title)
            .bind(&metadata_json)
            .bind(vec_to_blob(&ic.vector))
            .bind(ic.indexed_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        source_filter: Option<&[SourceType]>,
    ) -> Result<Vec<RetrievedResult>> {
        if query_vector.len() != self.dims {
            return Err(PipelineError::DimensionMismatch {
                expected: self.dims,
                actual: query_vector.len(),
            });
        }

        // The source filter is part of the candidate query, so scoring
        // runs over every eligible row rather than post-filtering a
        // truncated result set.
        let rows = match source_filter {
            Some(types) if !types.is_empty() => {
                let placeholders = vec!["?"; types.len()].join(", ");
                let sql = format!(
                    "SELECT chunk_id, document_id, chunk_index, text, metadata_json, embedding \
                     FROM indexed_chunks WHERE source_type IN ({placeholders})"
                );
                let mut query = sqlx::query(&sql);
                for t in types {
                    query = query.bind(t.as_str());
                }
                query.fetch_all(&self.pool).await?
            }
            _ => {
                sqlx::query(
                    "SELECT chunk_id, document_id, chunk_index, text, metadata_json, embedding \
                     FROM indexed_chunks",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut results = Vec::with_capacity(rows.len());

        for row in &rows {
            let metadata_json: String = row.get("metadata_json");
            let meta: DocMeta = serde_json::from_str(&metadata_json).map_err(|e| {
                PipelineError::IndexUnavailable(format!("corrupt metadata row: {e}"))
            })?;

            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let score = cosine_similarity(query_vector, &vector) as f64;

            results.push(RetrievedResult {
                chunk: Chunk {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    meta,
                },
                score,
            });
        }

        Ok(rank_results(results, top_k))
    }

    async fn source_stats(&self) -> Result<IndexStats> {
        let rows = sqlx::query(
            r#"
            SELECT source_type, COUNT(DISTINCT document_id) AS doc_count
            FROM indexed_chunks
            GROUP BY source_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sources = BTreeMap::new();
        for row in &rows {
            let source_type: String = row.get("source_type");
            if let Some(st) = SourceType::parse(&source_type) {
                sources.insert(st, row.get::<i64, _>("doc_count") as u64);
            }
        }

        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(IndexStats {
            sources,
            total_chunks: total_chunks as u64,
            timestamp: Utc::now(),
        })
    }
}
