//! Error types for the retrieval core.

use thiserror::Error;

/// Retrieval-core errors, one variant per failure policy class.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Filesystem read/write/walk failure.
    #[error("I/O error during {op}: {source}")]
    Io {
        /// The operation that failed (e.g. "tree walk", "cache write").
        op: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A document could not be parsed. Per-file parse failures during a
    /// build are logged and skipped; this surfaces only for required files.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// Path of the offending file.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The embedding model could not be loaded or invoked. Fatal for the
    /// current request; cache metadata is never written after this.
    #[error("embedding model unavailable: {0}")]
    EmbedderUnavailable(String),

    /// The cross-process build lock could not be acquired after retries.
    #[error("could not acquire build lock at {path}: {reason} (inspect the lock file if it looks stale)")]
    LockAcquisition {
        /// Lock file path.
        path: String,
        /// Why acquisition gave up.
        reason: String,
    },

    /// Cache files are present but unreadable (malformed JSON, truncation).
    #[error("cache unreadable: {0}")]
    CacheCorrupt(String),

    /// The external text generator failed; surfaced verbatim.
    #[error("text generation failed: {0}")]
    Generator(String),
}

impl RetrievalError {
    /// Short machine-readable kind, suitable for error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalError::Io { .. } => "io",
            RetrievalError::Parse { .. } => "parse",
            RetrievalError::EmbedderUnavailable(_) => "embedder_unavailable",
            RetrievalError::LockAcquisition { .. } => "lock_acquisition",
            RetrievalError::CacheCorrupt(_) => "cache_corrupt",
            RetrievalError::Generator(_) => "generator",
        }
    }

    /// Wrap an I/O error with the operation it interrupted.
    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        RetrievalError::Io { op, source }
    }
}

/// Result type alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
