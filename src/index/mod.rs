//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations needed by the
//! ingestion and query pipelines, enabling pluggable backends (SQLite,
//! in-memory for tests).
//!
//! The index owns [`IndexedChunk`] records keyed by `chunk_id`. Writing an
//! existing key fully replaces the prior record (vector, text, metadata,
//! timestamp), which is the idempotent re-ingestion guarantee.
//! Concurrent writes to disjoint chunk_id sets are safe; concurrent
//! writes to the same chunk_id are last-writer-wins by completion order.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{IndexedChunk, RetrievedResult, SourceType};

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Aggregate view of what's indexed, for the sources listing.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Distinct document count per source type.
    pub sources: BTreeMap<SourceType, u64>,
    /// Total indexed chunk rows across all sources.
    pub total_chunks: u64,
    pub timestamp: DateTime<Utc>,
}

/// Persistent store of embedded chunks supporting nearest-neighbor search
/// with exact source-type filters.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_schema`](VectorIndex::ensure_schema) | Idempotently provision the index |
/// | [`upsert`](VectorIndex::upsert) | Insert-or-replace chunks keyed by `chunk_id` |
/// | [`search`](VectorIndex::search) | Top-k cosine similarity search |
/// | [`source_stats`](VectorIndex::source_stats) | Per-source document/chunk counts |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently provision the underlying storage with the vector
    /// dimension and metric fixed at creation.
    ///
    /// Checks for an existing index first: provisioning an
    /// already-provisioned index is a no-op, but an existing index whose
    /// recorded dimension or model diverges from the configured embedder
    /// fails with `DimensionMismatchError` rather than silently mixing
    /// vector spaces.
    async fn ensure_schema(&self) -> Result<()>;

    /// Write chunks keyed by `chunk_id`, fully replacing any prior record
    /// under the same key. Fails with `DimensionMismatchError` if any
    /// vector's length differs from the index dimension; nothing is
    /// written in that case.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Return up to `top_k` chunks nearest to `query_vector`, sorted by
    /// descending similarity. When `source_filter` is given, only chunks
    /// of the listed source types are eligible — the filter constrains
    /// the candidate set before scoring, so a filtered search still
    /// returns `top_k` results whenever that many eligible chunks exist.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        source_filter: Option<&[SourceType]>,
    ) -> Result<Vec<RetrievedResult>>;

    /// Aggregate document and chunk counts per source type.
    async fn source_stats(&self) -> Result<IndexStats>;
}

/// Sort results by descending score, breaking ties by chunk id so output
/// order is deterministic, then truncate to `top_k`.
pub(crate) fn rank_results(mut results: Vec<RetrievedResult>, top_k: usize) -> Vec<RetrievedResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    results.truncate(top_k);
    results
}
