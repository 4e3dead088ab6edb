//! Conversational shortcuts.
//!
//! Greetings and a few fixed phrases are answered from canned strings
//! before any retrieval or LLM work happens. Detection runs on the
//! trimmed, lowercased message.

use rand::Rng;

/// Greetings that short-circuit the pipeline. A greeting matches exactly,
/// with a trailing space before more text, or with a trailing exclamation.
const GREETINGS: [&str; 8] = [
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    "howdy",
];

/// Canned greeting replies; one is chosen uniformly at random.
const GREETING_REPLIES: [&str; 3] = [
    "Hello! Ask me anything about the documents you've provided.",
    "Hi there! What would you like to know about these documents?",
    "Hey! I'm ready to answer questions about your documents.",
];

/// Exact phrases with fixed replies.
const PHRASE_REPLIES: [(&str, &str); 6] = [
    ("thanks", "You're welcome! Anything else you'd like to know?"),
    ("thank you", "You're welcome! Anything else you'd like to know?"),
    ("bye", "Goodbye! Come back any time."),
    ("goodbye", "Goodbye! Come back any time."),
    ("ok", "Great! Let me know if you have more questions."),
    ("okay", "Great! Let me know if you have more questions."),
];

/// Return the canned reply for a conversational message, if it is one.
pub(crate) fn canned_reply(message: &str) -> Option<String> {
    let normalized = message.trim().to_lowercase();

    if is_greeting(&normalized) {
        let pick = rand::rng().random_range(0..GREETING_REPLIES.len());
        return Some(GREETING_REPLIES[pick].to_string());
    }

    PHRASE_REPLIES
        .iter()
        .find(|(phrase, _)| normalized == *phrase)
        .map(|(_, reply)| reply.to_string())
}

fn is_greeting(normalized: &str) -> bool {
    GREETINGS.iter().any(|g| {
        normalized == *g
            || normalized
                .strip_prefix(g)
                .is_some_and(|rest| rest.starts_with(' ') || rest == "!")
    })
}
