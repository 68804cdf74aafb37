//! Consumer-facing API: the generation service trait, data types, and errors.

pub mod error;
pub mod types;

use async_trait::async_trait;

use types::{GenerationOutput, GenerationRequest};

/// The generation service consumed by hosting servers.
///
/// Implementations never panic on data-driven input and never return `Err`:
/// component failures are folded into a `status: error` output carrying the
/// error kind and a short message.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a document for `request`, retrieving project context,
    /// invoking the text generator, and appending source citations.
    async fn generate(&self, request: GenerationRequest) -> GenerationOutput;
}
