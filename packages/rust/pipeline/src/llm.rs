//! LLM completion service client.
//!
//! [`CompletionClient`] is the seam the grading and generation stages call
//! through; the production implementation talks to an OpenAI-compatible
//! `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use docqa_shared::{DocqaError, Result};

/// Per-request timeout for completion calls.
const COMPLETION_TIMEOUT_SECS: u64 = 60;

/// Sampling temperature for grading and generation.
const TEMPERATURE: f32 = 0.2;

/// Response length cap.
const MAX_TOKENS: usize = 1024;

/// Produces generated text from a prompt.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion call for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompletions {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiCompletions {
    /// Build a new completions client.
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Result<Self> {
        let auth = format!("Bearer {}", api_key.trim());
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DocqaError::config("API key contains invalid header characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(COMPLETION_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| DocqaError::Completion(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletions {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocqaError::Completion(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(DocqaError::Completion(format!(
                "completion request failed ({status}): {text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DocqaError::Completion(format!("invalid completion response: {e}")))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(answer)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
