//! SPI layer: provider contracts and environment configuration.
//!
//! `spi` declares what the core needs from the outside world — document
//! parsing, text generation, embedding inference — without binding to any
//! backend. Implementations live in `core` (local embedder, plain-text
//! parser) or in the host (LLM providers).

pub mod config;
pub mod embedding;
pub mod generator;
pub mod parser;
