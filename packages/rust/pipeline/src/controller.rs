//! The question-answering pipeline state machine.
//!
//! A linear chain with exactly one data-dependent branch and no retries:
//! `Retrieve → Grade → {Generate, Done} → GradeAnswer → Done`. Resilience
//! lives in the per-stage fallback policies (lenient grading, append-only
//! answer grading), not in re-execution.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use docqa_index::ChunkIndex;
use docqa_shared::{ConversationTurn, DocumentChunk, Result};

use crate::grader::{grade_answer, grade_relevance};
use crate::llm::CompletionClient;

// ---------------------------------------------------------------------------
// Retrieval seam
// ---------------------------------------------------------------------------

/// Source of ranked chunks for a query.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// Top-k chunks for the query, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>>;
}

#[async_trait]
impl ChunkRetriever for ChunkIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        self.search(query, k).await
    }
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Mutable state threaded through one pipeline run. Never shared across
/// requests; stages mutate it additively.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// The question being answered.
    pub question: String,
    /// Source URLs backing the index (for logging only; retrieval goes
    /// through the already-built index).
    pub source_urls: Vec<String>,
    /// Caller-supplied conversation history, oldest first.
    pub history: Vec<ConversationTurn>,
    /// Chunks as of the latest completed stage.
    pub retrieved_chunks: Vec<DocumentChunk>,
    /// The generated answer, once the generation stage has run.
    pub generated_answer: String,
}

impl PipelineState {
    pub fn new(
        question: impl Into<String>,
        source_urls: Vec<String>,
        history: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            question: question.into(),
            source_urls,
            history,
            ..Self::default()
        }
    }
}

/// Terminal output of a pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The (possibly annotated) answer; empty when no relevant passages
    /// survived grading.
    pub answer: String,
    /// The chunks the answer was generated from.
    pub documents: Vec<DocumentChunk>,
}

/// Stages of the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Retrieve,
    Grade,
    Generate,
    GradeAnswer,
    Done,
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Knobs for one pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Top-k chunks retrieved per question.
    pub top_k: usize,
    /// Trailing conversation turns included in the generation prompt.
    pub history_turns: usize,
    /// Chunk excerpt length (chars) sent to the relevance judge.
    pub grading_excerpt_chars: usize,
    /// Minimum chunks kept when grading rejects everything.
    pub grading_floor: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            history_turns: 6,
            grading_excerpt_chars: 1000,
            grading_floor: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// QaPipeline
// ---------------------------------------------------------------------------

/// Sequences retrieval, grading, generation, and answer grading over a
/// [`PipelineState`].
pub struct QaPipeline {
    completions: Arc<dyn CompletionClient>,
    opts: PipelineOptions,
}

impl QaPipeline {
    pub fn new(completions: Arc<dyn CompletionClient>, opts: PipelineOptions) -> Self {
        Self { completions, opts }
    }

    /// Run the state machine to completion.
    ///
    /// Retrieval and generation failures propagate; grading failures are
    /// absorbed by the stage fallbacks. The generation stage is entered
    /// only with non-empty `retrieved_chunks`.
    #[instrument(skip_all, fields(sources = state.source_urls.len()))]
    pub async fn run(
        &self,
        retriever: &dyn ChunkRetriever,
        mut state: PipelineState,
    ) -> Result<PipelineOutcome> {
        let mut stage = Stage::Retrieve;

        while stage != Stage::Done {
            stage = match stage {
                Stage::Retrieve => {
                    state.retrieved_chunks =
                        retriever.retrieve(&state.question, self.opts.top_k).await?;
                    debug!(retrieved = state.retrieved_chunks.len(), "retrieval complete");
                    Stage::Grade
                }
                Stage::Grade => {
                    state.retrieved_chunks = grade_relevance(
                        self.completions.as_ref(),
                        &state.question,
                        std::mem::take(&mut state.retrieved_chunks),
                        self.opts.grading_excerpt_chars,
                        self.opts.grading_floor,
                    )
                    .await;

                    // The single data-dependent branch: nothing relevant
                    // left means nothing to generate from.
                    if state.retrieved_chunks.is_empty() {
                        info!("no passages survived grading, terminating without answer");
                        Stage::Done
                    } else {
                        Stage::Generate
                    }
                }
                Stage::Generate => {
                    let prompt = self.generation_prompt(&state);
                    state.generated_answer = self.completions.complete(&prompt).await?;
                    debug!(answer_len = state.generated_answer.len(), "generation complete");
                    Stage::GradeAnswer
                }
                Stage::GradeAnswer => {
                    state.generated_answer = grade_answer(
                        self.completions.as_ref(),
                        &state.question,
                        std::mem::take(&mut state.generated_answer),
                    )
                    .await;
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }

        Ok(PipelineOutcome {
            answer: state.generated_answer,
            documents: state.retrieved_chunks,
        })
    }

    /// Render history (oldest first), context chunks, and the question into
    /// one generation prompt.
    fn generation_prompt(&self, state: &PipelineState) -> String {
        let mut prompt = String::new();

        let recent = recent_turns(&state.history, self.opts.history_turns);
        if !recent.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in recent {
                prompt.push_str(turn.role.label());
                prompt.push_str(": ");
                prompt.push_str(&turn.content);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("Use the following context to answer the question.\n\nContext:\n");
        for chunk in &state.retrieved_chunks {
            prompt.push_str(&chunk.text);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Question: ");
        prompt.push_str(&state.question);
        prompt
    }
}

/// The last `n` turns of history, preserving order (oldest of the window
/// first).
fn recent_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(n);
    &history[start..]
}
