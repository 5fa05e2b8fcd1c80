//! Grounded answer synthesis.
//!
//! Builds a prompt from the retrieved chunks in retrieval order, each
//! labelled with its title and source kind, followed by the user's
//! question and fixed grounding instructions, and asks a hosted chat
//! model to synthesize a cited answer.
//!
//! When retrieval produced no context, the [`Answerer`] returns a fixed
//! fallback message without calling the model at all: the model cannot
//! ground an answer in nothing, and the caller can tell this intentional
//! degradation apart from a provider failure (`GenerationError`).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{PipelineError, Result};
use crate::models::RetrievedResult;

/// Fixed response for queries that retrieved no context.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant information to answer your \
question. Please try rephrasing or asking about a different topic.";

/// A hosted chat completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a single-prompt request, returning the model's text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat model backed by an OpenAI-compatible chat completions endpoint.
///
/// Output length and temperature are fixed from configuration; transient
/// provider errors (429/5xx, network) are retried with the same backoff
/// policy as the embedding client.
pub struct HttpChatModel {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    api_key: String,
}

impl HttpChatModel {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, "retrying generation request after {:?}", delay);
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
                            PipelineError::Generation(format!("invalid response body: {e}"))
                        })?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::Generation(format!(
                            "provider error {status}: {body_text}"
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Generation(format!(
                        "provider error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::Generation(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::Generation("generation failed after retries".to_string())
        }))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            PipelineError::Generation("invalid response: missing message content".to_string())
        })
}

/// Composes the grounded prompt and invokes the chat model.
pub struct Answerer {
    chat: Arc<dyn ChatModel>,
}

impl Answerer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Produce an answer to `query` grounded in `context`.
    ///
    /// Empty context short-circuits to [`NO_CONTEXT_ANSWER`] without a
    /// model call. Provider failures surface as `GenerationError`.
    pub async fn answer(&self, query: &str, context: &[RetrievedResult]) -> Result<String> {
        if context.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let prompt = build_prompt(query, context);
        tracing::debug!(context_chunks = context.len(), "generating answer");
        self.chat.complete(&prompt).await
    }
}

/// Build the grounded prompt: labelled context in retrieval order, the
/// literal question, then the fixed grounding instructions.
pub fn build_prompt(query: &str, context: &[RetrievedResult]) -> String {
    let context_text = context
        .iter()
        .map(|r| {
            format!(
                "Source: {} ({})\n{}",
                r.chunk.meta.title,
                r.chunk.meta.source_type(),
                r.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an assistant that answers questions about organizational knowledge \
drawn from wikis, chat transcripts, issue trackers, and code repositories.\n\
\n\
Based on the following context, answer the user's question accurately.\n\
\n\
Context:\n\
{context_text}\n\
\n\
User Question: {query}\n\
\n\
Instructions:\n\
- Provide a clear, accurate answer based only on the context provided\n\
- If the context doesn't contain enough information, acknowledge this\n\
- Cite sources when making specific claims\n\
- Be concise but thorough\n\
- If there are conflicting pieces of information, acknowledge this\n\
\n\
Answer:"
    )
}
