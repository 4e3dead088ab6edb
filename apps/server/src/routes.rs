//! HTTP routing, request validation, timeout races, and response shaping.
//!
//! The two deadline races live here: one around the index cache, one around
//! the pipeline run. Deadlines depend on whether the cache was warm for the
//! request's URL set. Losing the index race leaves the detached build
//! running (configurable); losing the pipeline race cancels the run.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use docqa_index::IndexCache;
use docqa_pipeline::{
    CompletionClient, FALLBACK_QUESTIONS, NO_ANSWER_MESSAGE, PipelineOutcome, PipelineState,
    QaPipeline, suggest_questions,
};
use docqa_shared::{ConversationTurn, Deadlines, DocqaError, TimeoutPhase};

use crate::shortcuts;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub cache: Arc<IndexCache>,
    pub pipeline: Arc<QaPipeline>,
    pub completions: Arc<dyn CompletionClient>,
    pub deadlines: Deadlines,
    pub max_urls: usize,
    pub sample_top_k: usize,
    pub started_at: Instant,
}

/// Build the application router.
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/query", post(query))
        .route("/sample-questions", post(sample_questions))
        .route("/health", get(health))
        .route("/cpu-usage", get(cpu_usage))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "conversationHistory")]
    conversation_history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    success: bool,
    message: String,
    documents: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryRequest {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    success: bool,
    question: String,
    documents: Vec<String>,
    #[serde(rename = "documentCount")]
    document_count: usize,
    #[serde(rename = "generatedAnswer")]
    generated_answer: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SampleQuestionsRequest {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SampleQuestionsResponse {
    success: bool,
    questions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct CpuUsageResponse {
    success: bool,
    cpus: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    load_average: Option<LoadAverage>,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct LoadAverage {
    one: f64,
    five: f64,
    fifteen: f64,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// A request-level failure rendered as a JSON error body.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<DocqaError> for ApiError {
    fn from(err: DocqaError) -> Self {
        match &err {
            DocqaError::InvalidInput { message } => Self {
                status: StatusCode::BAD_REQUEST,
                error: message.clone(),
                message: None,
            },
            DocqaError::Timeout { phase } => Self {
                status: StatusCode::REQUEST_TIMEOUT,
                error: "Request Timeout".to_string(),
                message: Some(phase.to_string()),
            },
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Internal Server Error".to_string(),
                message: Some(err.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Parse and bound-check the request's source URLs.
fn validate_urls(raw: &[String], max_urls: usize) -> Result<Vec<Url>, DocqaError> {
    if raw.is_empty() {
        return Err(DocqaError::invalid_input(
            "at least one source URL is required",
        ));
    }
    if raw.len() > max_urls {
        return Err(DocqaError::invalid_input(format!(
            "too many source URLs: {} exceeds the limit of {max_urls}",
            raw.len()
        )));
    }

    raw.iter()
        .map(|s| {
            let url = Url::parse(s)
                .map_err(|e| DocqaError::invalid_input(format!("invalid URL '{s}': {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(DocqaError::invalid_input(format!(
                    "invalid URL '{s}': only http(s) sources are supported"
                )));
            }
            Ok(url)
        })
        .collect()
}

fn validate_message(message: &str) -> Result<(), DocqaError> {
    if message.trim().is_empty() {
        return Err(DocqaError::invalid_input("message must not be empty"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// The two deadline races
// ---------------------------------------------------------------------------

/// Resolve the index (racing the build against its deadline), then run the
/// pipeline (racing it against its own). Each race produces at most one
/// outcome; the lapsed timer is dropped with the race, and a detached
/// build keeps running to warm the cache for later requests.
async fn run_qa(
    state: &AppState,
    urls: Vec<Url>,
    question: String,
    history: Vec<ConversationTurn>,
) -> Result<PipelineOutcome, DocqaError> {
    let cold = !state.cache.is_warm(&urls);

    let index = tokio::time::timeout(
        state.deadlines.index_build(cold),
        state.cache.get_or_build(&urls),
    )
    .await
    .map_err(|_| {
        warn!(cold, "index race lost to its deadline");
        DocqaError::timeout(TimeoutPhase::IndexBuild { cold })
    })??;

    let pipeline_state = PipelineState::new(
        question,
        urls.iter().map(|u| u.to_string()).collect(),
        history,
    );

    let outcome = tokio::time::timeout(
        state.deadlines.pipeline(cold),
        state.pipeline.run(&*index, pipeline_state),
    )
    .await
    .map_err(|_| {
        warn!(cold, "pipeline race lost to its deadline");
        DocqaError::timeout(TimeoutPhase::Pipeline { cold })
    })??;

    info!(
        cold,
        documents = outcome.documents.len(),
        answered = !outcome.answer.is_empty(),
        "request answered"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(request_id = %Uuid::now_v7()))]
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let urls = validate_urls(&req.urls, state.max_urls)?;
    validate_message(&req.message)?;

    // Conversational shortcut: no retrieval or LLM cost.
    if let Some(reply) = shortcuts::canned_reply(&req.message) {
        info!("conversational shortcut matched");
        return Ok(Json(ChatResponse {
            success: true,
            message: reply,
            documents: Vec::new(),
        }));
    }

    let outcome = run_qa(&state, urls, req.message, req.conversation_history).await?;

    let message = if outcome.answer.trim().is_empty() {
        NO_ANSWER_MESSAGE.to_string()
    } else {
        outcome.answer
    };

    Ok(Json(ChatResponse {
        success: true,
        message,
        // Project chunks to their text only; no metadata leaves the server.
        documents: outcome.documents.into_iter().map(|c| c.text).collect(),
    }))
}

/// Legacy endpoint kept for older clients; same pipeline, different shape.
#[instrument(skip_all, fields(request_id = %Uuid::now_v7()))]
async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let urls = validate_urls(&req.urls, state.max_urls)?;
    validate_message(&req.question)?;

    let outcome = run_qa(&state, urls, req.question.clone(), Vec::new()).await?;

    let documents: Vec<String> = outcome.documents.into_iter().map(|c| c.text).collect();

    Ok(Json(QueryResponse {
        success: true,
        question: req.question,
        document_count: documents.len(),
        documents,
        generated_answer: outcome.answer,
    }))
}

/// Starter-question suggestions. Always 200: any failure past validation
/// degrades to the fixed fallback list.
#[instrument(skip_all)]
async fn sample_questions(
    State(state): State<AppState>,
    Json(req): Json<SampleQuestionsRequest>,
) -> Result<Json<SampleQuestionsResponse>, ApiError> {
    let urls = validate_urls(&req.urls, state.max_urls)?;

    let cold = !state.cache.is_warm(&urls);
    let questions = match tokio::time::timeout(
        state.deadlines.index_build(cold),
        state.cache.get_or_build(&urls),
    )
    .await
    {
        Ok(Ok(index)) => {
            suggest_questions(&*index, state.completions.as_ref(), state.sample_top_k).await
        }
        Ok(Err(e)) => {
            warn!(error = %e, "index build failed, using fallback questions");
            FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
        }
        Err(_) => {
            warn!(cold, "index build timed out, using fallback questions");
            FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
        }
    };

    Ok(Json(SampleQuestionsResponse {
        success: true,
        questions,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Host resource snapshot; process-wide, not pipeline-specific.
async fn cpu_usage(State(state): State<AppState>) -> Json<CpuUsageResponse> {
    Json(CpuUsageResponse {
        success: true,
        cpus: num_cpus::get(),
        load_average: read_load_average(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// 1/5/15-minute load averages from `/proc/loadavg`; absent off Linux.
fn read_load_average() -> Option<LoadAverage> {
    let raw = std::fs::read_to_string("/proc/loadavg").ok()?;
    let mut fields = raw.split_whitespace();
    Some(LoadAverage {
        one: fields.next()?.parse().ok()?,
        five: fields.next()?.parse().ok()?,
        fifteen: fields.next()?.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::test_support::{
        ScriptedCompletions, TestStateBuilder, serve_page, spawn_server,
    };

    fn doc_html() -> String {
        format!(
            "<html><body><main><h1>Product Guide</h1><p>{}</p></main></body></html>",
            "The product indexes web documents and answers questions about them. "
                .repeat(30)
        )
    }

    #[test]
    fn url_validation_bounds() {
        let one = vec!["https://example.com/a".to_string()];
        assert!(validate_urls(&one, 3).is_ok());

        assert!(validate_urls(&[], 3).is_err());

        let four: Vec<String> = (0..4).map(|i| format!("https://example.com/{i}")).collect();
        let err = validate_urls(&four, 3).unwrap_err();
        assert!(err.to_string().contains("limit of 3"));

        let bad = vec!["not a url".to_string()];
        assert!(validate_urls(&bad, 3).is_err());

        let ftp = vec!["ftp://example.com/file".to_string()];
        assert!(validate_urls(&ftp, 3).is_err());
    }

    #[test]
    fn message_validation() {
        assert!(validate_message("What is this?").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message("   \n ").is_err());
    }

    #[tokio::test]
    async fn health_and_cpu_usage_respond() {
        let (base, _ctx) = spawn_server(TestStateBuilder::new()).await;
        let client = reqwest::Client::new();

        let resp = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());

        let resp = client.get(format!("{base}/cpu-usage")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert!(body["cpus"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_with_400() {
        let (base, _ctx) = spawn_server(TestStateBuilder::new()).await;
        let client = reqwest::Client::new();

        // No URLs.
        let resp = client
            .post(format!("{base}/chat"))
            .json(&serde_json::json!({"urls": [], "message": "hello?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        // Four URLs, on every endpoint that takes them.
        let four: Vec<String> = (0..4).map(|i| format!("https://example.com/{i}")).collect();
        for (path, body) in [
            ("/chat", serde_json::json!({"urls": four, "message": "hi there everyone?"})),
            ("/query", serde_json::json!({"urls": four, "question": "what?"})),
            ("/sample-questions", serde_json::json!({"urls": four})),
        ] {
            let resp = client
                .post(format!("{base}{path}"))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "{path}");
            let body: serde_json::Value = resp.json().await.unwrap();
            assert!(body["error"].as_str().unwrap().contains("limit"));
        }

        // Empty message.
        let resp = client
            .post(format!("{base}/chat"))
            .json(&serde_json::json!({"urls": ["https://example.com/a"], "message": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn greetings_short_circuit_without_touching_the_pipeline() {
        // A server with no mocked document: any real pipeline run would
        // fail its fetch, so a 200 proves the shortcut fired.
        let doc_server = wiremock::MockServer::start().await;
        let doc_url = format!("{}/a", doc_server.uri());

        let builder = TestStateBuilder::new();
        let embedder = builder.embedder();
        let (base, _ctx) = spawn_server(builder).await;
        let client = reqwest::Client::new();

        for message in ["hi", "Hello!", "hey there"] {
            let resp = client
                .post(format!("{base}/chat"))
                .json(&serde_json::json!({
                    "urls": [doc_url.clone()],
                    "message": message
                }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200, "{message}");
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["success"], true);
            assert!(body["documents"].as_array().unwrap().is_empty());
            assert!(!body["message"].as_str().unwrap().is_empty());
        }

        // No retrieval or indexing happened for any greeting.
        assert_eq!(embedder.calls(), 0);

        // "hi-5" is not a greeting; it reaches the pipeline, whose fetch
        // of the unmocked URL fails with a build error.
        let resp = client
            .post(format!("{base}/chat"))
            .json(&serde_json::json!({
                "urls": [doc_url],
                "message": "hi-5"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
    }

    #[tokio::test]
    async fn chat_end_to_end_cold_then_warm() {
        let server = wiremock::MockServer::start().await;
        serve_page(&server, "/guide", &doc_html()).await;
        let doc_url = format!("{}/guide", server.uri());

        let builder = TestStateBuilder::new().with_completions(ScriptedCompletions::new(
            |prompt: &str| {
                if prompt.starts_with("You are judging") {
                    Ok("yes".to_string())
                } else {
                    Ok("It indexes web documents and answers questions.".to_string())
                }
            },
        ));
        let embedder = builder.embedder();
        let (base, _ctx) = spawn_server(builder).await;
        let client = reqwest::Client::new();

        let request = serde_json::json!({
            "urls": [doc_url],
            "message": "What is this about?"
        });

        // Cold path: build, retrieve, grade, generate.
        let resp = client
            .post(format!("{base}/chat"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert!(!body["message"].as_str().unwrap().is_empty());
        let documents = body["documents"].as_array().unwrap();
        assert!(!documents.is_empty());
        assert!(documents.len() <= 10);

        // One embed call for the chunk batch, one for the query.
        let calls_after_cold = embedder.calls();
        assert_eq!(calls_after_cold, 2);

        // Warm path: the same request reuses the cached index.
        let resp = client
            .post(format!("{base}/chat"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        // Only the query embedding is new; no rebuild happened.
        assert_eq!(embedder.calls(), calls_after_cold + 1);
    }

    #[tokio::test]
    async fn build_timeout_returns_408_and_warms_in_background() {
        let server = wiremock::MockServer::start().await;
        serve_page(&server, "/slow", &doc_html()).await;
        let doc_url = format!("{}/slow", server.uri());

        let builder = TestStateBuilder::new()
            .with_embed_delay(Duration::from_millis(300))
            .with_deadlines(Deadlines {
                cold_build: Duration::from_millis(50),
                warm: Duration::from_secs(5),
                pipeline_cold: Duration::from_secs(5),
                detach_background_builds: true,
            });
        let (base, _ctx) = spawn_server(builder).await;
        let client = reqwest::Client::new();

        let request = serde_json::json!({
            "urls": [doc_url],
            "message": "What is this about?"
        });

        let resp = client
            .post(format!("{base}/chat"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 408);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Request Timeout");
        assert!(body["message"].as_str().unwrap().contains("cold"));

        // The detached build finishes and warms the cache; the retry is
        // served from it within the warm deadline.
        tokio::time::sleep(Duration::from_millis(800)).await;

        let resp = client
            .post(format!("{base}/chat"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn query_legacy_response_shape() {
        let server = wiremock::MockServer::start().await;
        serve_page(&server, "/doc", &doc_html()).await;
        let doc_url = format!("{}/doc", server.uri());

        let (base, _ctx) = spawn_server(TestStateBuilder::new()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/query"))
            .json(&serde_json::json!({
                "urls": [doc_url],
                "question": "What does it index?"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["question"], "What does it index?");
        assert!(body["documentCount"].as_u64().unwrap() > 0);
        assert_eq!(
            body["documentCount"].as_u64().unwrap() as usize,
            body["documents"].as_array().unwrap().len()
        );
        assert!(body["generatedAnswer"].is_string());
    }

    #[tokio::test]
    async fn sample_questions_always_succeed() {
        let server = wiremock::MockServer::start().await;
        serve_page(&server, "/doc", &doc_html()).await;
        let doc_url = format!("{}/doc", server.uri());

        // Happy path: scripted generator emits a question list.
        let builder = TestStateBuilder::new().with_completions(ScriptedCompletions::new(
            |_: &str| Ok("What is indexed?\nHow fast is it?".to_string()),
        ));
        let (base, _ctx) = spawn_server(builder).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/sample-questions"))
            .json(&serde_json::json!({"urls": [doc_url.clone()]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        let questions = body["questions"].as_array().unwrap();
        assert!(!questions.is_empty());
        assert!(questions.len() <= 5);

        // Generator failure: still 200, fixed fallback list of three.
        let builder = TestStateBuilder::new().with_completions(ScriptedCompletions::new(
            |_: &str| Err(DocqaError::Completion("model unavailable".into())),
        ));
        let (base, _ctx) = spawn_server(builder).await;

        let resp = client
            .post(format!("{base}/sample-questions"))
            .json(&serde_json::json!({"urls": [doc_url]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["questions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn generation_failure_surfaces_500() {
        let server = wiremock::MockServer::start().await;
        serve_page(&server, "/doc", &doc_html()).await;
        let doc_url = format!("{}/doc", server.uri());

        let builder = TestStateBuilder::new().with_completions(ScriptedCompletions::new(
            |prompt: &str| {
                if prompt.starts_with("You are judging") {
                    Ok("yes".to_string())
                } else {
                    Err(DocqaError::Completion("model unavailable".into()))
                }
            },
        ));
        let (base, _ctx) = spawn_server(builder).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/chat"))
            .json(&serde_json::json!({
                "urls": [doc_url],
                "message": "What is this about?"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Internal Server Error");
    }
}
