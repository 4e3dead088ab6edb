//! DocQA server — chat with a small set of web documents.
//!
//! Fetches and indexes the documents behind a request's URLs, then answers
//! questions against them through retrieval, grading, and LLM generation.

mod cli;
mod routes;
mod shortcuts;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use docqa_index::{EmbeddingClient, IndexCache, IndexOptions, OpenAiEmbedder};
use docqa_ingest::{FetchOptions, Fetcher};
use docqa_pipeline::{CompletionClient, OpenAiCompletions, PipelineOptions, QaPipeline};
use docqa_shared::{Deadlines, api_key, load_config, load_config_from, validate_api_key};

use cli::Cli;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    cli::init_tracing(&cli);
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    // CLI flags override config file values.
    if let Some(mode) = cli.mode {
        config.server.mode = mode;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }

    // Fail fast without a usable credential.
    validate_api_key(&config)?;
    let key = api_key(&config)?;

    let deadlines = Deadlines::resolve(&config.timeouts, config.server.mode);

    let fetcher = Arc::new(Fetcher::new(FetchOptions::default())?);
    let embedder: Arc<dyn EmbeddingClient> = Arc::new(OpenAiEmbedder::new(
        &key,
        &config.openai.base_url,
        config.openai.embedding_model.clone(),
        config.openai.embed_batch_size,
    )?);
    let completions: Arc<dyn CompletionClient> = Arc::new(OpenAiCompletions::new(
        &key,
        &config.openai.base_url,
        config.openai.chat_model.clone(),
    )?);

    let cache = Arc::new(IndexCache::new(
        fetcher,
        embedder,
        IndexOptions {
            chunk_size: config.retrieval.chunk_size,
            chunk_overlap: config.retrieval.chunk_overlap,
        },
        config.cache.max_indexes,
        deadlines.detach_background_builds,
    ));

    let pipeline = Arc::new(QaPipeline::new(
        completions.clone(),
        PipelineOptions {
            top_k: config.retrieval.top_k,
            history_turns: config.retrieval.history_turns,
            grading_excerpt_chars: config.retrieval.grading_excerpt_chars,
            grading_floor: config.retrieval.grading_floor,
        },
    ));

    let state = AppState {
        cache,
        pipeline,
        completions,
        deadlines,
        max_urls: config.retrieval.max_urls,
        sample_top_k: config.retrieval.sample_top_k,
        started_at: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| eyre!("cannot bind {}: {e}", config.server.bind))?;

    info!(
        bind = %config.server.bind,
        mode = ?config.server.mode,
        chat_model = %config.openai.chat_model,
        embedding_model = %config.openai.embedding_model,
        "docqa server listening"
    );

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| eyre!("server error: {e}"))?;

    info!("server stopped");
    Ok(())
}

/// Resolves when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
