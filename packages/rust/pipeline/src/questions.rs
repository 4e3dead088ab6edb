//! Starter-question generation.
//!
//! Probes the index for representative passages and asks the LLM for a few
//! questions a reader might start with. This path never errors: any
//! failure falls back to a fixed question list.

use tracing::warn;

use crate::controller::ChunkRetriever;
use crate::llm::CompletionClient;

/// Fixed fallback when generation fails or yields nothing usable.
pub const FALLBACK_QUESTIONS: [&str; 3] = [
    "What is this document about?",
    "What are the main topics covered?",
    "Can you summarize the key points?",
];

/// Maximum questions returned.
const MAX_QUESTIONS: usize = 5;

/// Generic probe used to pull representative context out of the index.
const COVERAGE_PROBE: &str = "main topics and key points of this document";

/// Suggest up to five starter questions for the indexed documents.
pub async fn suggest_questions(
    retriever: &dyn ChunkRetriever,
    completions: &dyn CompletionClient,
    k: usize,
) -> Vec<String> {
    let chunks = match retriever.retrieve(COVERAGE_PROBE, k).await {
        Ok(chunks) if !chunks.is_empty() => chunks,
        Ok(_) => {
            warn!("index returned no context for question suggestions");
            return fallback();
        }
        Err(e) => {
            warn!(error = %e, "context retrieval for question suggestions failed");
            return fallback();
        }
    };

    let mut context = String::new();
    for chunk in &chunks {
        context.push_str(&chunk.text);
        context.push_str("\n\n");
    }

    let prompt = format!(
        "Based on the following document excerpts, suggest up to {MAX_QUESTIONS} short \
         questions a reader might ask about the content. Write one question per line, \
         with no numbering.\n\nExcerpts:\n{context}"
    );

    let reply = match completions.complete(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "question generation failed, using fallback list");
            return fallback();
        }
    };

    let questions: Vec<String> = reply
        .lines()
        .map(clean_question_line)
        .filter(|line| !line.is_empty())
        .take(MAX_QUESTIONS)
        .collect();

    if questions.is_empty() {
        warn!("question generation yielded nothing usable, using fallback list");
        return fallback();
    }

    questions
}

fn fallback() -> Vec<String> {
    FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// Strip list markers ("1.", "-", "*") and wrapping quotes from one line.
fn clean_question_line(line: &str) -> String {
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', '-', '*'])
        .trim()
        .trim_matches('"');
    trimmed.to_string()
}
