//! phasergun-test: reusable test support for the phasergun workspace.
//!
//! Provides RAII fixtures (temp directories, environment guards, project
//! trees) and deterministic mock providers for the retrieval SPI.

pub mod error;
pub mod fixture;
pub mod mock;

pub use error::TestError;
pub use fixture::{ProjectFixture, ScopedEnvVar, ScopedTempDir, DEFAULT_PRIMARY_CONTEXT};
pub use mock::{FailingGenerator, MockEmbedder, ScriptedGenerator, UnavailableEmbedder};

/// Install a test-friendly tracing subscriber. Safe to call repeatedly;
/// only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
