//! Shared fixtures for this crate's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use docqa_shared::{DocqaError, Result};

use crate::embedder::EmbeddingClient;

/// Deterministic embedder: inputs containing the keyword map to one axis,
/// everything else to the orthogonal axis. Optionally slow and/or failing,
/// with a call counter for single-flight assertions.
pub struct KeywordEmbedder {
    keyword: String,
    calls: AtomicUsize,
    delay: Duration,
    failures_left: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every `embed` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `n` calls with an embedding error.
    pub fn fail_times(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// How many times `embed` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(DocqaError::Embedding("synthetic embedding failure".into()));
        }

        Ok(inputs
            .iter()
            .map(|text| {
                if text.contains(&self.keyword) {
                    vec![1.0, 0.0]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .collect())
    }
}

/// Mount an HTML page on a wiremock server.
pub async fn serve_page(server: &wiremock::MockServer, path: &str, html: &str) {
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(path))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}
