//! Error types for the ingestion and query pipelines.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors produced by the pipeline components.
///
/// `DocumentTooShort` is recoverable (skip the document and continue the
/// batch); `EmbeddingService` and `Generation` are transient provider
/// failures eligible for retry by an external driver; `DimensionMismatch`
/// and `EmbeddingBatchTooLarge` are configuration errors and must not be
/// retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document text is below the minimum length after trimming.
    #[error("document text too short: {len} chars (minimum {min})")]
    DocumentTooShort { len: usize, min: usize },

    /// A single embedding request exceeded the provider's batch cap.
    #[error("embedding batch of {size} texts exceeds provider cap of {max}")]
    EmbeddingBatchTooLarge { size: usize, max: usize },

    /// The embedding provider failed or returned an unusable response.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The vector index could not be reached or provisioned.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// An embedding's length does not match the index's fixed dimension.
    /// Indicates a model/index version mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The language model provider failed during answer generation.
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// Caller-supplied input was rejected before any pipeline work.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An ingest step failed; wraps the originating component error
    /// annotated with the document it was processing.
    #[error("ingest failed for document {document_id}: {source}")]
    DocumentFailed {
        document_id: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Annotate a component error with the document being ingested.
    /// Already-annotated errors are passed through unchanged.
    pub fn for_document(self, document_id: &str) -> Self {
        match self {
            PipelineError::DocumentFailed { .. } => self,
            other => PipelineError::DocumentFailed {
                document_id: document_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The originating component error, unwrapping the ingest annotation.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::DocumentFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::IndexUnavailable(err.to_string())
    }
}
