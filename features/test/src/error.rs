//! Error type for test fixtures.

use thiserror::Error;

/// Failures while setting up or manipulating test fixtures.
#[derive(Debug, Error)]
pub enum TestError {
    /// Fixture setup or mutation failed.
    #[error("fixture error: {0}")]
    Fixture(String),
}
