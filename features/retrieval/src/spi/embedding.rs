//! Embedding SPI.
//!
//! Declares the provider contract for dense text embeddings. Implementations
//! live in `core::retrieval::embedder`; tests substitute deterministic mocks.

use async_trait::async_trait;

use crate::api::error::RetrievalResult;

/// Embedding dimensionality used throughout the core.
pub const EMBEDDING_DIM: usize = 384;

/// Generates L2-normalized vector embeddings from text.
///
/// The same input must yield byte-identical output across runs on the same
/// platform; providers that cannot guarantee this across platforms must
/// change `model_version` so caches invalidate instead of silently
/// disagreeing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one or more texts, returning one vector per input text.
    async fn embed(&self, texts: &[String]) -> RetrievalResult<Vec<Vec<f32>>>;

    /// Dimensionality of produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier baked into fingerprints and cache keys.
    fn model_version(&self) -> &str;
}
