//! Embedding, indexing, and the single-flight index cache for DocQA.
//!
//! This crate provides:
//! - [`EmbeddingClient`] — the embedding-service seam and its
//!   OpenAI-compatible implementation [`OpenAiEmbedder`]
//! - [`ChunkIndex`] — an immutable in-memory cosine-similarity index over
//!   document chunks
//! - [`IndexCache`] — the keyed cache guaranteeing at most one build per
//!   URL set under concurrent requests

mod cache;
mod chunk_index;
mod embedder;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{IndexCache, normalized_key};
pub use chunk_index::{ChunkIndex, IndexOptions};
pub use embedder::{EmbeddingClient, OpenAiEmbedder};
