//! In-memory nearest-neighbor index over document chunks.
//!
//! Built once per URL set: fetch every document, concatenate, chunk, embed.
//! Immutable after construction; queries embed the query text and rank
//! chunks by cosine similarity.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use url::Url;

use docqa_ingest::{Fetcher, chunk_text};
use docqa_shared::{DocqaError, DocumentChunk, Result};

use crate::embedder::EmbeddingClient;

/// Chunking geometry for index construction.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// A built index: chunks plus their embedding vectors, in original order.
pub struct ChunkIndex {
    entries: Vec<(DocumentChunk, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingClient>,
    fingerprint: String,
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("entries", &self.entries.len())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl ChunkIndex {
    /// Build an index over the given source URLs.
    ///
    /// Any single URL failing to fetch fails the whole build; embedding
    /// failures are likewise fatal. The spawning cache decides retry policy.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn build(
        urls: &[Url],
        fetcher: &Fetcher,
        embedder: Arc<dyn EmbeddingClient>,
        opts: IndexOptions,
    ) -> Result<Self> {
        let mut chunks: Vec<DocumentChunk> = Vec::new();
        let mut hasher = Sha256::new();

        for url in urls {
            let doc = fetcher
                .fetch_text(url)
                .await
                .map_err(|e| DocqaError::Build(e.to_string()))?;

            hasher.update(doc.content_hash.as_bytes());

            for piece in chunk_text(&doc.text, opts.chunk_size, opts.chunk_overlap) {
                chunks.push(DocumentChunk::new(piece, doc.url.clone()));
            }
        }

        if chunks.is_empty() {
            return Err(DocqaError::Build(
                "sources contained no indexable text".into(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .map_err(|e| DocqaError::Build(e.to_string()))?;

        if vectors.len() != chunks.len() {
            return Err(DocqaError::Build(format!(
                "embedded {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let fingerprint = format!("{:x}", hasher.finalize());

        info!(
            chunks = chunks.len(),
            fingerprint = %&fingerprint[..12],
            "chunk index built"
        );

        Ok(Self {
            entries: chunks.into_iter().zip(vectors).collect(),
            embedder,
            fingerprint,
        })
    }

    /// Top-k chunks by cosine similarity to the query, most similar first.
    /// Ties keep original chunk order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        let query_input = [query.to_string()];
        let query_vec = self
            .embedder
            .embed(&query_input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DocqaError::Embedding("service returned no query vector".into()))?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, vec))| (i, cosine_similarity(&query_vec, vec)))
            .collect();

        // Stable sort: equal scores keep ascending original index.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.entries[i].0.clone())
            .collect())
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content fingerprint of the indexed sources, for log correlation.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Cosine similarity; zero vectors compare as zero.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
