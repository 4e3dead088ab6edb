//! LLM-mediated grading: relevance of retrieved passages and adequacy of
//! the generated answer.
//!
//! Grading is a soft filter, never a hard gate. Only an explicit negative
//! judgment has any effect; anything else — including a judge failure —
//! keeps the passage or leaves the answer untouched.

use tracing::{debug, warn};

use docqa_shared::DocumentChunk;

use crate::llm::CompletionClient;

/// Fixed reply when the pipeline produced no usable answer.
pub const NO_ANSWER_MESSAGE: &str =
    "I could not find a relevant answer to your question in the provided documents.";

/// Suffix appended when the answer judge returns a negative verdict.
pub const QUALIFIER_NOTE: &str =
    "Note: this answer may not fully address your question based on the available documents.";

// ---------------------------------------------------------------------------
// Relevance grading
// ---------------------------------------------------------------------------

/// Filter retrieved chunks by one relevance judgment each.
///
/// A chunk is excluded only when the judge explicitly answers "no"; judge
/// failures keep the chunk. If every chunk is rejected, the first
/// `min(floor, len)` chunks are kept in retrieval-rank order — grading
/// never empties a non-empty result set.
pub(crate) async fn grade_relevance(
    completions: &dyn CompletionClient,
    question: &str,
    chunks: Vec<DocumentChunk>,
    excerpt_chars: usize,
    floor: usize,
) -> Vec<DocumentChunk> {
    if chunks.is_empty() {
        return chunks;
    }

    let total = chunks.len();
    let mut kept = Vec::with_capacity(total);

    for chunk in &chunks {
        let excerpt = truncate_chars(&chunk.text, excerpt_chars);
        let prompt = relevance_prompt(question, excerpt);

        match completions.complete(&prompt).await {
            Ok(reply) if is_explicit_no(&reply) => {
                debug!(source = %chunk.source_url, "judge rejected passage");
            }
            Ok(_) => kept.push(chunk.clone()),
            Err(e) => {
                warn!(error = %e, "relevance judgment failed, keeping passage");
                kept.push(chunk.clone());
            }
        }
    }

    if kept.is_empty() {
        let keep = floor.min(total);
        warn!(total, keep, "grading rejected every passage, keeping top-ranked");
        kept.extend(chunks.into_iter().take(keep));
    }

    kept
}

fn relevance_prompt(question: &str, excerpt: &str) -> String {
    format!(
        "You are judging whether a passage is relevant to a question.\n\
         Answer with a single word: yes or no.\n\n\
         Question: {question}\n\n\
         Passage:\n{excerpt}"
    )
}

// ---------------------------------------------------------------------------
// Answer grading
// ---------------------------------------------------------------------------

/// Judge the generated answer's adequacy.
///
/// A blank answer short-circuits to the fixed no-answer message. A negative
/// verdict appends [`QUALIFIER_NOTE`]; the answer itself is never discarded
/// or regenerated. Judge failures leave the answer untouched.
pub(crate) async fn grade_answer(
    completions: &dyn CompletionClient,
    question: &str,
    answer: String,
) -> String {
    if answer.trim().is_empty() {
        return NO_ANSWER_MESSAGE.to_string();
    }

    let prompt = answer_prompt(question, &answer);

    match completions.complete(&prompt).await {
        Ok(reply) if is_explicit_no(&reply) => {
            debug!("judge flagged answer as inadequate, appending qualifier");
            format!("{answer}\n\n{QUALIFIER_NOTE}")
        }
        Ok(_) => answer,
        Err(e) => {
            warn!(error = %e, "answer judgment failed, returning answer as-is");
            answer
        }
    }
}

fn answer_prompt(question: &str, answer: &str) -> String {
    format!(
        "You are judging whether an answer is helpful for a question.\n\
         Answer with a single word: yes or no.\n\n\
         Question: {question}\n\n\
         Answer:\n{answer}"
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An explicit negative is a reply whose first word is "no".
fn is_explicit_no(reply: &str) -> bool {
    reply
        .trim()
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .is_some_and(|w| w.eq_ignore_ascii_case("no"))
}

/// Truncate to at most `n` characters on a char boundary.
fn truncate_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
