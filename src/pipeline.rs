//! Pipeline orchestration.
//!
//! Two straight-line compositions with no branching logic of their own:
//!
//! - **Ingest**: validate → chunk → embed (batched) → upsert into the
//!   vector index → record in the metadata catalog. Every step is a hard
//!   dependency on the previous one succeeding; any failure aborts the
//!   whole document so no partial chunk set is ever committed, and the
//!   error is annotated with the document id.
//! - **Query**: retrieve → answer → format sources. Empty retrieval
//!   short-circuits to the fixed fallback answer with no sources and no
//!   model call.
//!
//! Ingesting different documents concurrently is safe since all writes
//! are keyed by chunk_id / document_id. Concurrent re-ingestion of the
//! same document interleaves as last-writer-wins per chunk; callers
//! needing strict consistency serialize per document id.

use chrono::Utc;
use std::sync::Arc;

use crate::answer::Answerer;
use crate::catalog::Catalog;
use crate::chunk::split_document;
use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::index::VectorIndex;
use crate::models::{
    IndexedChunk, IngestResult, NormalizedDocument, QueryOutput, RetrievedResult, SourceRef,
    SourceType,
};
use crate::retrieve::Retriever;

/// Documents whose trimmed text is shorter than this are rejected.
const MIN_TEXT_CHARS: usize = 10;

/// Maximum snippet length in a query response, in characters.
const SNIPPET_MAX_CHARS: usize = 200;

/// Ingestion orchestrator: one call indexes one normalized document.
pub struct IngestPipeline {
    chunking: ChunkingConfig,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    catalog: Arc<dyn Catalog>,
}

impl IngestPipeline {
    pub fn new(
        chunking: ChunkingConfig,
        embedding: &EmbeddingConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            chunking,
            batch_size: embedding.batch_size,
            embedder,
            index,
            catalog,
        }
    }

    /// Chunk, embed, and index one document.
    ///
    /// Re-ingesting a document with the same `document_id` overwrites its
    /// chunks in place and replaces its catalog entry; nothing is written
    /// at all when any step fails.
    pub async fn ingest(&self, document: &NormalizedDocument) -> Result<IngestResult> {
        self.ingest_inner(document)
            .await
            .map_err(|e| e.for_document(&document.document_id))
    }

    async fn ingest_inner(&self, document: &NormalizedDocument) -> Result<IngestResult> {
        let trimmed_len = document.text.trim().len();
        if trimmed_len < MIN_TEXT_CHARS {
            return Err(PipelineError::DocumentTooShort {
                len: trimmed_len,
                min: MIN_TEXT_CHARS,
            });
        }

        let chunks = split_document(document, &self.chunking);
        tracing::debug!(
            document_id = %document.document_id,
            chunks = chunks.len(),
            "split document"
        );

        // Embed in provider-sized batches; input order is preserved so
        // vectors line up with chunks.
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embedder.embed(batch).await?);
        }

        if vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingService(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let indexed_at = Utc::now();
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk {
                chunk,
                vector,
                indexed_at,
            })
            .collect();

        self.index.upsert(&indexed).await?;

        let chunk_ids: Vec<String> = indexed.iter().map(|ic| ic.chunk.chunk_id.clone()).collect();
        self.catalog
            .record(&document.document_id, &chunk_ids, &document.meta)
            .await?;

        tracing::info!(
            document_id = %document.document_id,
            chunks_written = chunk_ids.len(),
            source_type = %document.meta.source_type(),
            "ingested document"
        );

        Ok(IngestResult {
            document_id: document.document_id.clone(),
            chunks_written: chunk_ids.len(),
        })
    }
}

/// Query orchestrator: retrieval composed with grounded answering.
pub struct QueryPipeline {
    retriever: Retriever,
    answerer: Answerer,
}

impl QueryPipeline {
    pub fn new(retriever: Retriever, answerer: Answerer) -> Self {
        Self {
            retriever,
            answerer,
        }
    }

    /// Answer a natural-language question from the indexed chunks.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        source_filter: Option<&[SourceType]>,
    ) -> Result<QueryOutput> {
        let results = self.retriever.retrieve(text, top_k, source_filter).await?;

        // Empty retrieval is designed degradation, not an error: skip the
        // model entirely.
        let answer = self.answerer.answer(text, &results).await?;
        let sources = results.iter().map(source_ref).collect();

        Ok(QueryOutput {
            answer,
            sources,
            query: text.to_string(),
            timestamp: Utc::now(),
        })
    }
}

fn source_ref(result: &RetrievedResult) -> SourceRef {
    let meta = &result.chunk.meta;
    let url = if meta.source_url.is_empty() {
        format!("Document from {}", meta.source_type())
    } else {
        meta.source_url.clone()
    };

    SourceRef {
        title: meta.title.clone(),
        url,
        source_type: meta.source_type(),
        relevance_score: result.score,
        snippet: snippet(&result.chunk.text),
    }
}

/// Truncate chunk text to at most 200 characters, appending an ellipsis
/// when truncated.
fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
    format!("{truncated}...")
}
