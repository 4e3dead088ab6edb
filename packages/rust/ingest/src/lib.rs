//! Document fetching and chunking for DocQA.
//!
//! The [`Fetcher`] downloads a source URL and reduces it to readable text;
//! [`chunk_text`] splits that text into overlapping retrieval windows.
//! Both are collaborators of the index build — a per-URL fetch failure is
//! fatal to the build that requested it.

mod chunker;
mod extract;

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use docqa_shared::{DocqaError, Result};

pub use chunker::chunk_text;
pub use extract::extract_text;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("DocQA/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for document fetches.
const FETCH_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// FetchedDocument
// ---------------------------------------------------------------------------

/// A source document reduced to readable text.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// The URL the document was fetched from.
    pub url: String,
    /// Extracted readable text.
    pub text: String,
    /// SHA-256 of the extracted text, for log correlation.
    pub content_hash: String,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Options for constructing a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Allow localhost/private IPs (for tests against mock servers).
    pub allow_private_hosts: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: FETCH_TIMEOUT_SECS,
            allow_private_hosts: false,
        }
    }
}

/// HTTP document fetcher with SSRF protection.
pub struct Fetcher {
    client: Client,
    allow_private_hosts: bool,
}

impl Fetcher {
    /// Create a fetcher with the given options.
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_private_hosts: options.allow_private_hosts,
        })
    }

    /// Fetch a URL and extract its readable text.
    pub async fn fetch_text(&self, url: &Url) -> Result<FetchedDocument> {
        if !self.allow_private_hosts && is_private_target(url) {
            warn!(%url, "refusing to fetch private/loopback target");
            return Err(DocqaError::Network(format!(
                "{url}: refusing to fetch private or loopback address"
            )));
        }

        debug!(%url, "fetching document");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| DocqaError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocqaError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DocqaError::Network(format!("{url}: body read failed: {e}")))?;

        let text = extract_text(&body)?;
        if text.is_empty() {
            return Err(DocqaError::Network(format!(
                "{url}: page contained no readable text"
            )));
        }

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        debug!(%url, text_len = text.len(), hash = %&content_hash[..12], "document fetched");

        Ok(FetchedDocument {
            url: url.to_string(),
            text,
            content_hash,
            fetched_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check whether a URL points at something we should not fetch on behalf
/// of a caller: non-HTTP schemes, loopback/private addresses, local names.
fn is_private_target(url: &Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return true;
    }

    let Some(host) = url.host_str() else {
        return true;
    };

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => {
                v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
            }
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
    }

    host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
}
