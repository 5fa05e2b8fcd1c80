//! Core data models used throughout Lorekeeper.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of system a document was pulled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Wiki,
    Chat,
    Tracker,
    Repo,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Wiki => "wiki",
            SourceType::Chat => "chat",
            SourceType::Tracker => "tracker",
            SourceType::Repo => "repo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wiki" => Some(SourceType::Wiki),
            "chat" => Some(SourceType::Chat),
            "tracker" => Some(SourceType::Tracker),
            "repo" => Some(SourceType::Repo),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source metadata, closed over the known source kinds.
///
/// Tagged by `source_type` so a missing field is a deserialization error
/// at ingest time rather than a surprise at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "lowercase")]
pub enum SourceDetail {
    Wiki {
        space: String,
        page_id: String,
    },
    Chat {
        channel: String,
        message_count: u32,
    },
    Tracker {
        issue_key: String,
        status: String,
        issue_type: String,
    },
    Repo {
        repository: String,
        #[serde(default)]
        language: Option<String>,
    },
}

impl SourceDetail {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceDetail::Wiki { .. } => SourceType::Wiki,
            SourceDetail::Chat { .. } => SourceType::Chat,
            SourceDetail::Tracker { .. } => SourceType::Tracker,
            SourceDetail::Repo { .. } => SourceType::Repo,
        }
    }
}

/// Source metadata carried from a document to every chunk derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub title: String,
    pub source_url: String,
    #[serde(flatten)]
    pub detail: SourceDetail,
}

impl DocMeta {
    pub fn source_type(&self) -> SourceType {
        self.detail.source_type()
    }
}

/// A document in the common shape produced by the external normalization
/// step. Immutable once handed to the pipeline; re-fetching the same
/// source item produces a new document with the same `document_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Stable hash of the source identity.
    pub document_id: String,
    pub text: String,
    #[serde(flatten)]
    pub meta: DocMeta,
}

/// Derive a stable document identity from the source coordinates.
///
/// SHA-256 over `source_type` and `source_url`, hex-encoded. Re-fetching
/// the same source item always maps to the same document id, which is
/// what makes re-ingestion an overwrite rather than a duplicate.
pub fn derive_document_id(source_type: SourceType, source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_str().as_bytes());
    hasher.update(b"/");
    hasher.update(source_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A bounded text segment of a document, the unit of embedding and
/// retrieval. Never mutated; superseded wholesale on re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}_chunk_{chunk_index}` — deterministic, so
    /// re-ingesting a document overwrites its prior chunks in place.
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub meta: DocMeta,
}

impl Chunk {
    pub fn id_for(document_id: &str, chunk_index: i64) -> String {
        format!("{document_id}_chunk_{chunk_index}")
    }
}

/// A chunk plus its embedding vector and ingestion timestamp, as persisted
/// in the vector index keyed by `chunk_id`.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

/// One catalog record per document version, tracking which chunks the
/// document produced. Superseded wholesale on re-ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub document_id: String,
    pub chunk_ids: Vec<String>,
    pub total_chunks: usize,
    pub meta: DocMeta,
    pub processed_at: DateTime<Utc>,
}

/// A chunk returned from similarity search, with its relevance score.
/// Ephemeral; produced per query and never persisted.
#[derive(Debug, Clone)]
pub struct RetrievedResult {
    pub chunk: Chunk,
    pub score: f64,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub document_id: String,
    pub chunks_written: usize,
}

/// A source reference attached to a query answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub source_type: SourceType,
    pub relevance_score: f64,
    pub snippet: String,
}

/// The full response to a query: the synthesized answer plus the sources
/// it was grounded in, in retrieval order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}
