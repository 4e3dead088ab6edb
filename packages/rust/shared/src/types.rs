//! Core domain types for DocQA.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DocumentChunk
// ---------------------------------------------------------------------------

/// A bounded substring of a source document, the unit of retrieval.
///
/// Immutable once produced by the chunker; owned by the index that
/// embedded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// The chunk text.
    pub text: String,
    /// URL of the document this chunk came from.
    pub source_url: String,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_url: source_url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation history
// ---------------------------------------------------------------------------

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering history into a generation prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One turn of caller-supplied conversation history.
///
/// The caller sends the full history with every request; there is no
/// server-side session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
