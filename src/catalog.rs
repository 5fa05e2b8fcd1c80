//! Metadata catalog: a durable side-index of which chunks each document
//! produced.
//!
//! The catalog exists so re-indexing and audits can answer "what chunks
//! does document X currently own" without scanning the vector index. Rows
//! are denormalized, one per chunk with `total_chunks` on each, so
//! chunk-level queries need no joins.
//!
//! Recording a document replaces its prior rows wholesale inside one
//! transaction. A re-ingestion that produces fewer chunks than before
//! therefore cannot leave stale rows for now-nonexistent chunk indices.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{PipelineError, Result};
use crate::models::{CatalogEntry, DocMeta};

/// Durable record of document-to-chunk ownership.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Idempotently provision the catalog's storage.
    async fn ensure_schema(&self) -> Result<()>;

    /// Record the chunks produced by one document version, replacing any
    /// prior record for the same `document_id`.
    async fn record(&self, document_id: &str, chunk_ids: &[String], meta: &DocMeta) -> Result<()>;

    /// Fetch the current entry for a document, or `None` if it has never
    /// been ingested.
    async fn lookup(&self, document_id: &str) -> Result<Option<CatalogEntry>>;
}

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_entries (
                document_id TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                source_type TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                processed_at INTEGER NOT NULL,
                PRIMARY KEY (document_id, chunk_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record(&self, document_id: &str, chunk_ids: &[String], meta: &DocMeta) -> Result<()> {
        let metadata_json = serde_json::to_string(meta).map_err(|e| {
            PipelineError::IndexUnavailable(format!("metadata serialization failed: {e}"))
        })?;
        let processed_at = Utc::now().timestamp();
        let total = chunk_ids.len() as i64;

        let mut tx = self.pool.begin().await?;

        // Document-scoped delete-then-insert: shrinking chunk counts never
        // leave orphaned rows behind.
        sqlx::query("DELETE FROM catalog_entries WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (idx, chunk_id) in chunk_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO catalog_entries
                    (document_id, chunk_id, chunk_index, total_chunks, source_type, source_url, title, metadata_json, processed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(document_id)
            .bind(chunk_id)
            .bind(idx as i64)
            .bind(total)
            .bind(meta.source_type().as_str())
            .bind(&meta.source_url)
            .bind(&meta.title)
            .bind(&metadata_json)
            .bind(processed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn lookup(&self, document_id: &str) -> Result<Option<CatalogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, total_chunks, metadata_json, processed_at
            FROM catalog_entries
            WHERE document_id = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let metadata_json: String = first.get("metadata_json");
        let meta: DocMeta = serde_json::from_str(&metadata_json)
            .map_err(|e| PipelineError::IndexUnavailable(format!("corrupt catalog row: {e}")))?;
        let total_chunks: i64 = first.get("total_chunks");
        let processed_at: i64 = first.get("processed_at");

        Ok(Some(CatalogEntry {
            document_id: document_id.to_string(),
            chunk_ids: rows.iter().map(|r| r.get("chunk_id")).collect(),
            total_chunks: total_chunks as usize,
            meta,
            processed_at: chrono::DateTime::from_timestamp(processed_at, 0)
                .unwrap_or_else(Utc::now),
        }))
    }
}

/// In-memory [`Catalog`] for tests.
pub struct MemoryCatalog {
    entries: RwLock<HashMap<String, CatalogEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn record(&self, document_id: &str, chunk_ids: &[String], meta: &DocMeta) -> Result<()> {
        let entry = CatalogEntry {
            document_id: document_id.to_string(),
            chunk_ids: chunk_ids.to_vec(),
            total_chunks: chunk_ids.len(),
            meta: meta.clone(),
            processed_at: Utc::now(),
        };
        self.entries
            .write()
            .unwrap()
            .insert(document_id.to_string(), entry);
        Ok(())
    }

    async fn lookup(&self, document_id: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.entries.read().unwrap().get(document_id).cloned())
    }
}
