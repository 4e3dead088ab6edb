//! Application configuration for DocQA.
//!
//! User config lives at `~/.docqa/docqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocqaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docqa";

// ---------------------------------------------------------------------------
// Config structs (matching docqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAI-compatible service settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Request deadline settings.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Retrieval and grading knobs.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Index cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Deployment mode; selects the warm-cache deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Mode {
    type Err = DocqaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(DocqaError::config(format!(
                "unknown mode '{other}': expected 'development' or 'production'"
            ))),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to (host:port).
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Deployment mode.
    #[serde(default)]
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            mode: Mode::default(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat-completion model used for grading and answer generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used for chunk and query vectors.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Max inputs per embedding request.
    #[serde(default = "default_embed_batch")]
    pub embed_batch_size: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embed_batch_size: default_embed_batch(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embed_batch() -> usize {
    32
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Deadline for the first build of a URL set (cold cache).
    #[serde(default = "default_cold_build_secs")]
    pub cold_build_secs: u64,

    /// Warm-cache deadline in development mode.
    #[serde(default = "default_warm_development_secs")]
    pub warm_development_secs: u64,

    /// Warm-cache deadline in production mode.
    #[serde(default = "default_warm_production_secs")]
    pub warm_production_secs: u64,

    /// Pipeline deadline when the index build for this request was cold.
    #[serde(default = "default_pipeline_cold_secs")]
    pub pipeline_cold_secs: u64,

    /// Keep an in-flight index build running after its requester times
    /// out, so the cache still warms for later requests.
    #[serde(default = "default_true")]
    pub detach_background_builds: bool,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            cold_build_secs: default_cold_build_secs(),
            warm_development_secs: default_warm_development_secs(),
            warm_production_secs: default_warm_production_secs(),
            pipeline_cold_secs: default_pipeline_cold_secs(),
            detach_background_builds: true,
        }
    }
}

fn default_cold_build_secs() -> u64 {
    180
}
fn default_warm_development_secs() -> u64 {
    120
}
fn default_warm_production_secs() -> u64 {
    25
}
fn default_pipeline_cold_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Top-k chunks retrieved for question answering.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Top-k chunks used as context for sample-question generation.
    #[serde(default = "default_sample_top_k")]
    pub sample_top_k: usize,

    /// Maximum number of source URLs per request.
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// How many trailing conversation turns feed the generation prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Chunk excerpt length (characters) sent to the relevance judge.
    #[serde(default = "default_grading_excerpt_chars")]
    pub grading_excerpt_chars: usize,

    /// Minimum chunks kept when grading rejects everything.
    #[serde(default = "default_grading_floor")]
    pub grading_floor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            sample_top_k: default_sample_top_k(),
            max_urls: default_max_urls(),
            history_turns: default_history_turns(),
            grading_excerpt_chars: default_grading_excerpt_chars(),
            grading_floor: default_grading_floor(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_top_k() -> usize {
    10
}
fn default_sample_top_k() -> usize {
    5
}
fn default_max_urls() -> usize {
    3
}
fn default_history_turns() -> usize {
    6
}
fn default_grading_excerpt_chars() -> usize {
    1000
}
fn default_grading_floor() -> usize {
    3
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of built indexes kept in memory (LRU beyond this).
    #[serde(default = "default_max_indexes")]
    pub max_indexes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_indexes: default_max_indexes(),
        }
    }
}

fn default_max_indexes() -> usize {
    32
}

// ---------------------------------------------------------------------------
// Deadlines (runtime, resolved from config + mode)
// ---------------------------------------------------------------------------

/// Resolved request deadlines for the active mode.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    /// Index-build race deadline when the cache is cold for the key.
    pub cold_build: Duration,
    /// Index-build and pipeline deadline on the warm path.
    pub warm: Duration,
    /// Pipeline deadline when this request's index build was cold.
    pub pipeline_cold: Duration,
    /// Whether builds outlive a requester that timed out.
    pub detach_background_builds: bool,
}

impl Deadlines {
    /// Resolve deadlines from the config sections and the active mode.
    pub fn resolve(timeouts: &TimeoutsConfig, mode: Mode) -> Self {
        let warm_secs = match mode {
            Mode::Development => timeouts.warm_development_secs,
            Mode::Production => timeouts.warm_production_secs,
        };
        Self {
            cold_build: Duration::from_secs(timeouts.cold_build_secs),
            warm: Duration::from_secs(warm_secs),
            pipeline_cold: Duration::from_secs(timeouts.pipeline_cold_secs),
            detach_background_builds: timeouts.detach_background_builds,
        }
    }

    /// Deadline for the index-build race.
    pub fn index_build(&self, cold: bool) -> Duration {
        if cold { self.cold_build } else { self.warm }
    }

    /// Deadline for the pipeline race, given how the build went.
    pub fn pipeline(&self, cold: bool) -> Duration {
        if cold { self.pipeline_cold } else { self.warm }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocqaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docqa/docqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DocqaError::config(format!("cannot read {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| DocqaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| DocqaError::config(format!("cannot create {}: {e}", dir.display())))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocqaError::config(e.to_string()))?;

    std::fs::write(&path, content)
        .map_err(|e| DocqaError::config(format!("cannot write {}: {e}", path.display())))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty.
///
/// Called once at startup; the server refuses to boot without a key.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(DocqaError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read the API key named by the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            DocqaError::config(format!(
                "API key not found. Set the {var_name} environment variable."
            ))
        })
}
