//! Text generation SPI.
//!
//! The LLM provider is an external collaborator; the core only defines the
//! contract it calls through. Implementations wrap whatever backend the host
//! wires in.

use async_trait::async_trait;

use crate::api::error::RetrievalResult;

/// Sampling parameters for a generation call. The orchestrator always sends
/// deterministic settings (temperature 0, top_p 1, fixed seed).
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    /// Fixed seed, where the backend supports one.
    pub seed: Option<u64>,
    /// Output token ceiling, when set.
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.0, top_p: 1.0, seed: Some(0), max_tokens: None }
    }
}

/// Text produced by the generator, with token accounting.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// External text-generation provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate from a system context and a user task message.
    async fn generate(
        &self,
        system_text: &str,
        user_text: &str,
        params: &GenerationParams,
    ) -> RetrievalResult<GeneratedText>;
}
