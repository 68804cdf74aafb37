//! phasergun-retrieval crate entry point.
//!
//! Re-exports the public API and provides the service factory.
//!
//! # Architecture (SEA pattern)
//!
//! ```text
//! Facade - lib.rs (this file): re-exports, factory
//! Core   - core/: orchestrator, retrieval pipeline, cache lifecycle
//! API    - api/: GenerationService trait, request/response types, errors
//! SPI    - spi/: DocumentParser, TextGenerator, EmbeddingProvider, config
//! ```

pub mod api;
pub mod core;
pub mod spi;

use std::sync::Arc;

// ── Public re-exports ──

pub use crate::api::error::{RetrievalError, RetrievalResult};
pub use crate::api::types::{
    Chunk, ConfidenceLevel, ConfidenceRating, ContextCategory, DocCategory, FileSummary,
    GenerationMetadata, GenerationOptions, GenerationOutput, GenerationRequest, GenerationStatus,
    Reference, RetrievalOptions, RetrievedContext, SearchResult, SourceKey, UsageStats,
};
pub use crate::api::GenerationService;
pub use crate::core::retrieval::cache::{CacheCoordinator, CacheEntry};
pub use crate::core::retrieval::service::RetrievalService;
pub use crate::core::DefaultGenerationService;
pub use crate::spi::config::RetrievalConfig;
pub use crate::spi::embedding::{EmbeddingProvider, EMBEDDING_DIM};
pub use crate::spi::generator::{GeneratedText, GenerationParams, TextGenerator};
pub use crate::spi::parser::{DocumentParser, ParsedDocument, PlainTextParser};

/// Wire a generation service from explicit parts.
///
/// This is the dependency-injected assembly path: callers own every
/// provider, nothing is process-global.
pub fn create_generation_service_with(
    config: RetrievalConfig,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
) -> DefaultGenerationService {
    let coordinator = Arc::new(CacheCoordinator::new(&config, parser.clone(), embedder.clone()));
    let retrieval = Arc::new(RetrievalService::new(coordinator, parser, embedder));
    DefaultGenerationService::new(retrieval, generator)
}

/// Factory: create the generation service from environment configuration,
/// the bundled plain-text parser, and the local embedding model.
///
/// Fails with `EmbedderUnavailable` when the local model cannot be loaded.
/// The host should call this once at startup:
/// ```ignore
/// let service = phasergun_retrieval::create_generation_service(generator)?;
/// ```
#[cfg(feature = "embed-local")]
pub fn create_generation_service(
    generator: Arc<dyn TextGenerator>,
) -> RetrievalResult<DefaultGenerationService> {
    let config = RetrievalConfig::from_env();
    let parser: Arc<dyn DocumentParser> = Arc::new(PlainTextParser::new());
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(crate::core::retrieval::embedder::FastEmbedProvider::new()?);
    Ok(create_generation_service_with(config, parser, embedder, generator))
}
