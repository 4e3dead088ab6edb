//! Error types for DocQA.
//!
//! Library crates use [`DocqaError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics at
//! startup and maps variants to HTTP status codes per request.

/// Which deadline race lapsed, and whether the cache was cold for this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting on the index build (cache population).
    IndexBuild { cold: bool },
    /// Waiting on the question-answering pipeline.
    Pipeline { cold: bool },
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexBuild { cold: true } => {
                write!(f, "document indexing (cold cache) took too long")
            }
            Self::IndexBuild { cold: false } => {
                write!(f, "document lookup (warm cache) took too long")
            }
            Self::Pipeline { cold: true } => {
                write!(f, "answer generation after a cold index build took too long")
            }
            Self::Pipeline { cold: false } => {
                write!(f, "answer generation (warm cache) took too long")
            }
        }
    }
}

/// Top-level error type for all DocQA operations.
#[derive(Debug, thiserror::Error)]
pub enum DocqaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Request validation failure (bad URLs, empty message). Never retried.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Network/HTTP error while fetching a source document.
    #[error("network error: {0}")]
    Network(String),

    /// Fetch or embedding failure while constructing a chunk index.
    /// A failed build leaves no cache entry, so a later request may retry.
    #[error("index build error: {0}")]
    Build(String),

    /// Embedding service call failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// LLM completion call failure. Fatal only for answer generation;
    /// grading swallows it under the lenient-inclusion policy.
    #[error("completion error: {0}")]
    Completion(String),

    /// A deadline race lapsed. Surfaced as HTTP 408.
    #[error("timeout: {phase}")]
    Timeout { phase: TimeoutPhase },

    /// Response or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocqaError>;

impl DocqaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input validation error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a timeout error for the given race phase.
    pub fn timeout(phase: TimeoutPhase) -> Self {
        Self::Timeout { phase }
    }

    /// Whether this error came from a lapsed deadline race.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
