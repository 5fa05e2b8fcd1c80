use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::index::VectorIndex;
use crate::models::{RetrievedResult, SourceType};

/// Similarity retrieval: embed the query, search the index.
///
/// An empty result is a normal outcome (nothing indexed, or nothing
/// passes the filter), not an error; the answering layer decides what an
/// empty context means.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Return up to `top_k` chunks most similar to `query`, optionally
    /// restricted to the given source types. Requesting more results than
    /// exist returns all available matches.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&[SourceType]>,
    ) -> Result<Vec<RetrievedResult>> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(PipelineError::InvalidRequest(
                "top_k must be >= 1".to_string(),
            ));
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let results = self.index.search(&query_vector, top_k, source_filter).await?;

        tracing::debug!(
            results = results.len(),
            top_k,
            "retrieved context for query"
        );

        Ok(results)
    }
}
