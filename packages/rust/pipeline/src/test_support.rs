//! Shared fixtures for this crate's tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use docqa_shared::{DocqaError, DocumentChunk, Result};

use crate::controller::ChunkRetriever;
use crate::llm::CompletionClient;

/// Completion client driven by a closure, recording every prompt.
pub struct ScriptedCompletions {
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

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
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

/// Retriever returning a fixed chunk list, or a fixed error.
pub struct StaticRetriever {
    chunks: Vec<DocumentChunk>,
    error: Option<String>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks,
            error: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl ChunkRetriever for StaticRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        if let Some(message) = &self.error {
            return Err(DocqaError::Embedding(message.clone()));
        }
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}
