//! Embedding providers and the on-disk embedding memo.
//!
//! The local provider runs all-MiniLM-L6-v2 through ONNX inference (behind
//! the `embed-local` feature). Per-chunk vectors are memoized on disk under
//! content-addressed keys so unchanged chunks never touch the model again.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::api::error::{RetrievalError, RetrievalResult};
use crate::spi::embedding::EmbeddingProvider;

use super::persist::{read_json, write_json_atomic};

// ── FastEmbedProvider ───────────────────────────────────────────────

/// Local ONNX-based embedding via the `fastembed` crate.
///
/// Uses `sentence-transformers/all-MiniLM-L6-v2` (384 dimensions). The model
/// is downloaded and cached on first use; a load failure surfaces as
/// `EmbedderUnavailable`.
#[cfg(feature = "embed-local")]
pub struct FastEmbedProvider {
    model: fastembed::TextEmbedding,
    model_version: String,
    dimension: usize,
}

#[cfg(feature = "embed-local")]
impl FastEmbedProvider {
    /// Initialize the default model.
    pub fn new() -> RetrievalResult<Self> {
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false),
        )
        .map_err(|e| RetrievalError::EmbedderUnavailable(format!("model init failed: {e}")))?;

        Ok(Self {
            model,
            model_version: "all-MiniLM-L6-v2".to_string(),
            dimension: crate::spi::embedding::EMBEDDING_DIM,
        })
    }
}

#[cfg(feature = "embed-local")]
#[async_trait::async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: &[String]) -> RetrievalResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts_owned: Vec<String> = texts.to_vec();
        let mut vectors = self
            .model
            .embed(texts_owned, None)
            .map_err(|e| RetrievalError::EmbedderUnavailable(format!("inference failed: {e}")))?;
        for v in &mut vectors {
            l2_normalize(v);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

// ── Normalization ───────────────────────────────────────────────────

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ── Batched embedding ───────────────────────────────────────────────

/// Embed `texts` through `provider` in fixed-size batches, preserving input
/// order in the output.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> RetrievalResult<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let vectors = provider.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(RetrievalError::EmbedderUnavailable(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        out.extend(vectors);
    }
    Ok(out)
}

// ── On-disk memo ────────────────────────────────────────────────────

/// Content-addressed embedding memo.
///
/// A hit returns the stored vector without invoking the model. Entries are
/// keyed by `(relative path, content hash, model version)` so any content or
/// model change misses cleanly.
#[derive(Debug, Clone)]
pub struct EmbeddingMemo {
    dir: PathBuf,
}

impl EmbeddingMemo {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Memo key for one chunk.
    pub fn key(rel_path: &str, content_hash: &str, model_version: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(rel_path.as_bytes());
        hasher.update(b"\x00");
        hasher.update(content_hash.as_bytes());
        hasher.update(b"\x00");
        hasher.update(model_version.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Stored vector for `key`, if present and readable.
    pub fn load(&self, key: &str) -> Option<Vec<f32>> {
        read_json(&self.path_for(key)).ok().flatten()
    }

    /// Persist a vector under `key`. Write failures are logged, not fatal:
    /// the memo is an optimization, never a source of truth.
    pub fn store(&self, key: &str, vector: &[f32]) {
        if let Err(e) = write_json_atomic(&self.path_for(key), &vector) {
            tracing::warn!(key, error = %e, "failed to persist embedding memo entry");
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}
