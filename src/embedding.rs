//! Embedding provider contract and implementations.
//!
//! `embed`/`embed_batch`/`dimension` behind an `async_trait` object, with a
//! `reqwest::Client` doing Bearer-auth JSON POSTs for the network-backed
//! provider and a batch packer that respects a per-batch token budget
//! alongside the usual max-item-count limit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// chars-per-token estimate used only for batch packing; deliberately
/// tighter than the chunker's ~4 chars/token to leave headroom.
const BATCH_CHARS_PER_TOKEN: usize = 3;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Pack `texts` into batches respecting `max_count` and a `max_tokens`
/// per-batch budget (estimated at `BATCH_CHARS_PER_TOKEN` chars/token). A
/// single oversize text is sent alone in its own batch rather than stalling
/// the rest of the run.
pub fn pack_batches(texts: &[String], max_count: usize, max_tokens: usize) -> Vec<Vec<usize>> {
    let max_chars = max_tokens.saturating_mul(BATCH_CHARS_PER_TOKEN);
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_chars = 0usize;

    for (idx, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        if len > max_chars {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            batches.push(vec![idx]);
            continue;
        }
        let would_overflow_count = current.len() + 1 > max_count;
        let would_overflow_chars = current_chars + len > max_chars;
        if !current.is_empty() && (would_overflow_count || would_overflow_chars) {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(idx);
        current_chars += len;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// OpenAI-compatible HTTP embedding provider (OpenAI itself, or any server
/// implementing the same `/embeddings` request/response shape).
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingProvider {
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: self.model.clone(),
            input,
            dimensions: Some(self.dimension as i64),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::EmbeddingProviderFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::EmbeddingProviderFailure(format!("{status}: {text}")));
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| IndexError::EmbeddingProviderFailure(e.to_string()))?;

        let mut pairs: Vec<(usize, Vec<f32>)> = parsed.data.into_iter().map(|d| (d.index, d.embedding)).collect();
        pairs.sort_by_key(|(idx, _)| *idx);
        Ok(pairs.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.request_embeddings(vec![text.to_string()]).await?;
        result.pop().ok_or_else(|| IndexError::EmbeddingProviderFailure("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts.to_vec()).await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Deterministic hashing-trick embedder used by tests and the benchmark
/// harness's smoke scenario: same text always maps to the same unit-norm
/// vector, and lexical overlap between texts pulls their vectors closer,
/// without any network dependency.
pub struct FakeEmbeddingProvider {
    dimension: usize,
}

impl FakeEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let h = crate::hash::sha256_text(word.as_bytes());
            let bucket = (u32::from_str_radix(&h[0..8], 16).unwrap_or(0) as usize) % self.dimension;
            let sign = if u8::from_str_radix(&h[8..10], 16).unwrap_or(0) % 2 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
