//! Shared fixtures for the server's tests: deterministic embedding and
//! completion fakes, and a helper that boots the router on an ephemeral
//! port.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use docqa_index::{EmbeddingClient, IndexCache, IndexOptions};
use docqa_ingest::{FetchOptions, Fetcher};
use docqa_pipeline::{CompletionClient, PipelineOptions, QaPipeline};
use docqa_shared::{Deadlines, Mode, Result, TimeoutsConfig};

use crate::routes::{AppState, router};

// ---------------------------------------------------------------------------
// Embedding fake
// ---------------------------------------------------------------------------

/// Deterministic embedder: inputs containing the keyword map to one axis,
/// everything else to the orthogonal axis. Counts calls; optionally slow.
pub(crate) struct KeywordEmbedder {
    keyword: String,
    calls: AtomicUsize,
    delay: Duration,
}

impl KeywordEmbedder {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

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

// ---------------------------------------------------------------------------
// Completion fake
// ---------------------------------------------------------------------------

/// Completion client driven by a closure, recording every prompt.
pub(crate) struct ScriptedCompletions {
    script: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletions {
    pub fn new(script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletions {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        (self.script)(prompt)
    }
}

// ---------------------------------------------------------------------------
// Server bootstrapping
// ---------------------------------------------------------------------------

/// Assembles an [`AppState`] from fakes, with overridable pieces.
pub(crate) struct TestStateBuilder {
    embedder: Arc<KeywordEmbedder>,
    completions: Arc<ScriptedCompletions>,
    deadlines: Deadlines,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            embedder: Arc::new(KeywordEmbedder::new("product")),
            completions: Arc::new(ScriptedCompletions::new(|prompt: &str| {
                if prompt.starts_with("You are judging") {
                    Ok("yes".to_string())
                } else {
                    Ok("It indexes web documents and answers questions.".to_string())
                }
            })),
            deadlines: Deadlines::resolve(&TimeoutsConfig::default(), Mode::Development),
        }
    }

    /// Handle to the embedding fake for call-count assertions.
    pub fn embedder(&self) -> Arc<KeywordEmbedder> {
        self.embedder.clone()
    }

    pub fn with_completions(mut self, completions: ScriptedCompletions) -> Self {
        self.completions = Arc::new(completions);
        self
    }

    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embedder = Arc::new(KeywordEmbedder::new("product").with_delay(delay));
        self
    }

    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }
}

/// Boot the router on an ephemeral port; returns its base URL and the
/// serving task's handle.
pub(crate) async fn spawn_server(
    builder: TestStateBuilder,
) -> (String, tokio::task::JoinHandle<()>) {
    let fetcher = Arc::new(
        Fetcher::new(FetchOptions {
            allow_private_hosts: true,
            ..FetchOptions::default()
        })
        .expect("fetcher"),
    );

    let cache = Arc::new(IndexCache::new(
        fetcher,
        builder.embedder.clone(),
        IndexOptions::default(),
        8,
        builder.deadlines.detach_background_builds,
    ));

    let state = AppState {
        cache,
        pipeline: Arc::new(QaPipeline::new(
            builder.completions.clone(),
            PipelineOptions::default(),
        )),
        completions: builder.completions.clone(),
        deadlines: builder.deadlines,
        max_urls: 3,
        sample_top_k: 5,
        started_at: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });

    (format!("http://{addr}"), handle)
}

/// Mount an HTML page on a wiremock server.
pub(crate) async fn serve_page(server: &wiremock::MockServer, path: &str, html: &str) {
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(path))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}
