//! Text-embedding service client.
//!
//! [`EmbeddingClient`] is the seam the index builds against; the production
//! implementation talks to an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use docqa_shared::{DocqaError, Result};

/// Per-request timeout for embedding calls.
const EMBED_TIMEOUT_SECS: u64 = 30;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed each input, returning one vector per input in order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Embeddings client for OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Build a new embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self> {
        let auth = format!("Bearer {}", api_key.trim());
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DocqaError::config("API key contains invalid header characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| DocqaError::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| DocqaError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(DocqaError::Embedding(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DocqaError::Embedding(format!("invalid embedding response: {e}")))?;

        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(DocqaError::Embedding(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }

        debug!(inputs = inputs.len(), "embedded inputs");
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
