//! Core layer: the orchestrator and the retrieval pipeline behind it.

pub mod generate;
pub mod prompt;
pub mod retrieval;

pub use generate::DefaultGenerationService;
