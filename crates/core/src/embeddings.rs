use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::error::{ChatError, IngestError};

pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBED_DIMENSIONS: usize = 1536;
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Failed(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<EmbedError> for IngestError {
    fn from(error: EmbedError) -> Self {
        match error {
            EmbedError::Failed(details) => IngestError::EmbeddingFailed(details),
            EmbedError::Timeout(after) => IngestError::EmbeddingTimeout(after),
        }
    }
}

impl From<EmbedError> for ChatError {
    fn from(error: EmbedError) -> Self {
        match error {
            EmbedError::Failed(details) => ChatError::EmbeddingFailed(details),
            EmbedError::Timeout(after) => ChatError::EmbeddingTimeout(after),
        }
    }
}

/// Maps text to a fixed-length dense vector. A workspace index must use a
/// single embedder identity for its whole lifetime; mixing models silently
/// produces meaningless similarity scores.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| EmbedError::Failed(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimensions,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        // Newlines in chunk text produce embedding artifacts with these models.
        let clean_text = text.replace('\n', " ");

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": clean_text,
            }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                EmbedError::Timeout(self.timeout)
            } else {
                EmbedError::Failed(error.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(EmbedError::Failed(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbedError::Failed(error.to_string()))?;

        let vector = payload
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| EmbedError::Failed("embedding response had no rows".to_string()))?;

        if vector.len() != self.dimensions {
            return Err(EmbedError::Failed(format!(
                "embedding dimension {} does not match configured {}",
                vector.len(),
                self.dimensions
            )));
        }

        Ok(vector)
    }
}

/// Deterministic character-trigram hashing embedder. No network, no model
/// download; useful offline and in tests, with the same fixed-dimensionality
/// contract as the HTTP embedder.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}
