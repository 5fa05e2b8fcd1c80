//! Shared fakes and fixtures for integration tests.

use async_trait::async_trait;

use lorekeeper::answer::ChatModel;
use lorekeeper::embedding::Embedder;
use lorekeeper::error::Result;
use lorekeeper::models::{DocMeta, NormalizedDocument, SourceDetail, SourceType};

pub const DIMS: usize = 16;

/// Deterministic bag-of-words embedder. Each lowercase token hashes to a
/// bucket and the count vector is L2-normalized, so texts sharing words
/// score higher cosine similarity than unrelated texts. Enough signal
/// for relevance assertions without a hosted model.
pub struct FakeEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut h = 0usize;
        for b in word.bytes() {
            h = h.wrapping_mul(31).wrapping_add(b as usize);
        }
        v[h % DIMS] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Chat model that returns a canned answer, proving it was (or wasn't)
/// invoked without any network dependency.
pub struct CannedChat(pub &'static str);

#[async_trait]
impl ChatModel for CannedChat {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub fn meta_for(source: SourceType, title: &str, url: &str) -> DocMeta {
    let detail = match source {
        SourceType::Wiki => SourceDetail::Wiki {
            space: "ENG".to_string(),
            page_id: "100".to_string(),
        },
        SourceType::Chat => SourceDetail::Chat {
            channel: "incidents".to_string(),
            message_count: 8,
        },
        SourceType::Tracker => SourceDetail::Tracker {
            issue_key: "OPS-42".to_string(),
            status: "open".to_string(),
            issue_type: "bug".to_string(),
        },
        SourceType::Repo => SourceDetail::Repo {
            repository: "acme/platform".to_string(),
            language: Some("Rust".to_string()),
        },
    };
    DocMeta {
        title: title.to_string(),
        source_url: url.to_string(),
        detail,
    }
}

pub fn document(id: &str, source: SourceType, title: &str, text: &str) -> NormalizedDocument {
    NormalizedDocument {
        document_id: id.to_string(),
        text: text.to_string(),
        meta: meta_for(source, title, &format!("https://example.com/{id}")),
    }
}
