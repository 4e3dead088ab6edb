//! The DocQA question-answering pipeline.
//!
//! This crate ties retrieval, relevance grading, answer generation, and
//! answer grading into the [`QaPipeline`] state machine, and provides the
//! [`CompletionClient`] seam to the LLM completion service.

mod controller;
mod grader;
mod llm;
mod questions;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{
    ChunkRetriever, PipelineOptions, PipelineOutcome, PipelineState, QaPipeline,
};
pub use grader::{NO_ANSWER_MESSAGE, QUALIFIER_NOTE};
pub use llm::{CompletionClient, OpenAiCompletions};
pub use questions::{FALLBACK_QUESTIONS, suggest_questions};
