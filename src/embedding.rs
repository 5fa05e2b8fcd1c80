//! Embedding service abstraction and HTTP provider.
//!
//! Defines the [`Embedder`] trait implemented by embedding backends and a
//! concrete [`HttpEmbedder`] that calls a hosted embeddings API. Documents
//! and queries are embedded by the same model into the same vector space;
//! a query vector is only comparable to stored vectors produced by the
//! same model at the same dimensionality.
//!
//! # Retry Strategy
//!
//! The HTTP provider retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The pipeline layered on top never retries; anything surfacing from
//! here is final for the current invocation.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{PipelineError, Result};

/// A service that maps text to fixed-dimension vectors.
///
/// Implementations are constructed by the application and injected into
/// the pipelines; tests substitute deterministic fakes.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// The embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input
    /// order. All-or-nothing: a provider failure fails the whole batch,
    /// never a truncated result.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string in the same vector space as documents.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        if vectors.len() != 1 {
            return Err(PipelineError::EmbeddingService(format!(
                "expected 1 vector for query, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Embedding provider backed by an OpenAI-compatible embeddings endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable. Batches are capped
/// at `max_batch_size`; the ingest pipeline splits its requests below the
/// cap, and a direct caller exceeding it gets an error rather than a
/// silently split request.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_batch: usize,
    max_retries: u32,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            dims: config.dims,
            max_batch: config.max_batch_size,
            max_retries: config.max_retries,
            api_key,
        })
    }

    async fn call_provider(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, "retrying embedding request after {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::EmbeddingService(format!(
                                "invalid response body: {e}"
                            ))
                        })?;
                        return parse_embedding_response(&json, texts.len());
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::EmbeddingService(format!(
                            "provider error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::EmbeddingService(format!(
                        "provider error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::EmbeddingService(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::EmbeddingService("embedding failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.max_batch {
            return Err(PipelineError::EmbeddingBatchTooLarge {
                size: texts.len(),
                max: self.max_batch,
            });
        }

        let vectors = self.call_provider(texts).await?;

        for v in &vectors {
            if v.len() != self.dims {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.dims,
                    actual: v.len(),
                });
            }
        }

        Ok(vectors)
    }
}

/// Parse the embeddings API response JSON, restoring input order from the
/// per-item `index` field.
fn parse_embedding_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            PipelineError::EmbeddingService("invalid response: missing data array".to_string())
        })?;

    if data.len() != expected {
        return Err(PipelineError::EmbeddingService(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PipelineError::EmbeddingService(
                    "invalid response: missing embedding".to_string(),
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_response_restores_input_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_embedding_response(&json, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_before_any_call() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let embedder = HttpEmbedder::new(&EmbeddingConfig {
            max_batch_size: 4,
            batch_size: 4,
            ..EmbeddingConfig::default()
        })
        .unwrap();

        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let err = embedder.embed(&texts).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmbeddingBatchTooLarge { size: 5, max: 4 }
        ));
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        });
        let err = parse_embedding_response(&json, 2).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingService(_)));
    }
}
