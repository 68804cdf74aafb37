//! Deterministic mock providers.
//!
//! `MockEmbedder` produces bag-of-words hash vectors so texts that share
//! tokens score higher under cosine similarity, without any model. It
//! records every embedded text, which lets concurrency tests assert that a
//! cold cache is built exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use phasergun_retrieval::api::error::{RetrievalError, RetrievalResult};
use phasergun_retrieval::spi::embedding::EmbeddingProvider;
use phasergun_retrieval::spi::generator::{GeneratedText, GenerationParams, TextGenerator};

// ── MockEmbedder ────────────────────────────────────────────────────

/// Deterministic token-hash embedder.
///
/// Each lowercase whitespace token maps to a fixed slot and sign in a
/// small vector; token overlap between two texts raises their cosine
/// similarity. Output is L2-normalized like the real provider.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    embedded_texts: Mutex<Vec<String>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(16)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension, calls: AtomicUsize::new(0), embedded_texts: Mutex::new(Vec::new()) }
    }

    /// Number of `embed` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text embedded so far, in call order.
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded_texts.lock().clone()
    }

    /// How many times `text` has been embedded.
    pub fn times_embedded(&self, text: &str) -> usize {
        self.embedded_texts.lock().iter().filter(|t| t.as_str() == text).count()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let slot = digest[0] as usize % self.dimension;
            let sign = if digest[1] % 2 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> RetrievalResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.embedded_texts.lock().extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        "mock-token-hash-v1"
    }
}

// ── UnavailableEmbedder ─────────────────────────────────────────────

/// Embedder that always fails, for fatal-path tests.
pub struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _texts: &[String]) -> RetrievalResult<Vec<Vec<f32>>> {
        Err(RetrievalError::EmbedderUnavailable("mock model refused to load".to_string()))
    }

    fn dimension(&self) -> usize {
        16
    }

    fn model_version(&self) -> &str {
        "unavailable"
    }
}

// ── ScriptedGenerator ───────────────────────────────────────────────

/// Text generator that returns a canned response and records what it was
/// asked.
pub struct ScriptedGenerator {
    response: String,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
    last_user: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
            last_user: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// System text from the most recent call.
    pub fn last_system(&self) -> Option<String> {
        self.last_system.lock().clone()
    }

    /// User/task text from the most recent call.
    pub fn last_user(&self) -> Option<String> {
        self.last_user.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        system_text: &str,
        user_text: &str,
        _params: &GenerationParams,
    ) -> RetrievalResult<GeneratedText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock() = Some(system_text.to_string());
        *self.last_user.lock() = Some(user_text.to_string());
        Ok(GeneratedText {
            text: self.response.clone(),
            input_tokens: ((system_text.len() + user_text.len()) / 4) as u32,
            output_tokens: (self.response.len() / 4).max(1) as u32,
        })
    }
}

/// Generator that always fails, for error-envelope tests.
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(
        &self,
        _system_text: &str,
        _user_text: &str,
        _params: &GenerationParams,
    ) -> RetrievalResult<GeneratedText> {
        Err(RetrievalError::Generator("mock backend rejected the request".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed(&["design control".to_string()]).await.unwrap();
        let b = embedder.embed(&["design control".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn token_overlap_raises_similarity() {
        let embedder = MockEmbedder::new();
        let vectors = embedder
            .embed(&[
                "purpose of design control".to_string(),
                "the purpose of design control activities".to_string(),
                "shipping container logistics manifest".to_string(),
            ])
            .await
            .unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        let related = dot(&vectors[0], &vectors[1]);
        let unrelated = dot(&vectors[0], &vectors[2]);
        assert!(
            related > unrelated,
            "token overlap must dominate: related={related}, unrelated={unrelated}"
        );
    }

    #[tokio::test]
    async fn embedder_records_texts() {
        let embedder = MockEmbedder::new();
        embedder.embed(&["one".to_string(), "two".to_string()]).await.unwrap();
        embedder.embed(&["one".to_string()]).await.unwrap();
        assert_eq!(embedder.times_embedded("one"), 2);
        assert_eq!(embedder.times_embedded("two"), 1);
        assert_eq!(embedder.embedded_texts().len(), 3);
    }

    #[tokio::test]
    async fn scripted_generator_records_last_call() {
        let generator = ScriptedGenerator::new("generated body");
        let result = generator
            .generate("system side", "task side", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(result.text, "generated body");
        assert_eq!(generator.last_system().unwrap(), "system side");
        assert_eq!(generator.last_user().unwrap(), "task side");
        assert_eq!(generator.calls(), 1);
    }
}
