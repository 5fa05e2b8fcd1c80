//! In-memory [`VectorIndex`] implementation for testing.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Search
//! is brute-force cosine similarity over all stored vectors, matching the
//! SQLite backend's semantics without any I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::cosine_similarity;
use crate::error::{PipelineError, Result};
use crate::models::{IndexedChunk, RetrievedResult, SourceType};

use super::{rank_results, IndexStats, VectorIndex};

pub struct MemoryIndex {
    dims: usize,
    chunks: RwLock<HashMap<String, IndexedChunk>>,
}

impl MemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored chunk records.
    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_schema(&self) -> Result<()> {
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

        let mut stored = self.chunks.write().unwrap();
        for ic in chunks {
            stored.insert(ic.chunk.chunk_id.clone(), ic.clone());
        }
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

        let stored = self.chunks.read().unwrap();
        let results: Vec<RetrievedResult> = stored
            .values()
            .filter(|ic| match source_filter {
                Some(types) if !types.is_empty() => {
                    types.contains(&ic.chunk.meta.source_type())
                }
                _ => true,
            })
            .map(|ic| RetrievedResult {
                chunk: ic.chunk.clone(),
                score: cosine_similarity(query_vector, &ic.vector) as f64,
            })
            .collect();

        Ok(rank_results(results, top_k))
    }

    async fn source_stats(&self) -> Result<IndexStats> {
        let stored = self.chunks.read().unwrap();

        let mut docs_by_source: BTreeMap<SourceType, std::collections::HashSet<&str>> =
            BTreeMap::new();
        for ic in stored.values() {
            docs_by_source
                .entry(ic.chunk.meta.source_type())
                .or_default()
                .insert(ic.chunk.document_id.as_str());
        }

        Ok(IndexStats {
            sources: docs_by_source
                .into_iter()
                .map(|(k, v)| (k, v.len() as u64))
                .collect(),
            total_chunks: stored.len() as u64,
            timestamp: Utc::now(),
        })
    }
}
