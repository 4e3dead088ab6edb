//! HTML-to-text extraction.
//!
//! Reduces a fetched HTML page to readable text: picks the main content
//! container, strips page chrome, converts the remainder with `htmd`, and
//! normalizes whitespace.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use docqa_shared::{DocqaError, Result};

/// Tags dropped entirely during conversion.
const SKIP_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
];

/// Extract readable text from a raw HTML page.
pub fn extract_text(html: &str) -> Result<String> {
    let content_html = content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| DocqaError::parse(format!("html conversion failed: {e}")))?;

    let text = normalize_whitespace(&markdown);
    debug!(html_len = html.len(), text_len = text.len(), "extracted text");

    Ok(text)
}

/// Pick the main content container, skipping page chrome where possible.
fn content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Known content containers in priority order.
    for sel_str in ["article", "main", "[role=\"main\"]", ".content"] {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

/// Collapse runs of blank lines and intra-line whitespace.
fn normalize_whitespace(text: &str) -> String {
    static BLANK_LINES: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    static SPACES: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

    let collapsed = SPACES.replace_all(text, " ");
    let collapsed = BLANK_LINES.replace_all(&collapsed, "\n\n");
    collapsed.trim().to_string()
}
