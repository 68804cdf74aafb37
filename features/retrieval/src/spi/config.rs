//! Configuration from environment variables.

use std::path::PathBuf;

use crate::core::retrieval::chunker::ChunkerConfig;
use crate::core::retrieval::lock::LockConfig;

/// Retrieval-core configuration. Services receive this by value at
/// construction; nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Whether on-disk cache reads and writes are enabled. When false the
    /// index is still built, but only in memory.
    pub cache_enabled: bool,
    /// Root directory for all cache artifacts.
    pub cache_dir: PathBuf,
    /// Default number of procedure chunks per query.
    pub top_k_procedures: usize,
    /// Default number of context chunks per query.
    pub top_k_context: usize,
    /// Include summaries in assembled contexts by default.
    pub include_summaries: bool,
    /// Approximate assembled-context ceiling in tokens.
    pub max_context_tokens: usize,
    /// Extractive summary length in whitespace tokens.
    pub summary_words: usize,
    /// Embedding batch size during index builds.
    pub embed_batch_size: usize,
    /// Cross-process lock behavior.
    pub lock: LockConfig,
    /// Chunking thresholds.
    pub chunker: ChunkerConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_dir: std::env::temp_dir().join("phasergun-cache"),
            top_k_procedures: 3,
            top_k_context: 2,
            include_summaries: true,
            max_context_tokens: 150_000,
            summary_words: 250,
            embed_batch_size: 32,
            lock: LockConfig::default(),
            chunker: ChunkerConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Purpose |
    /// |----------|---------|---------|
    /// | `CACHE_ENABLED` | `true` | Enable/disable the on-disk cache |
    /// | `PHASERGUN_CACHE_DIR` | `$TMPDIR/phasergun-cache` | Cache root directory |
    /// | `PHASERGUN_TOP_K_PROCEDURES` | `3` | Default procedure top-K |
    /// | `PHASERGUN_TOP_K_CONTEXT` | `2` | Default context top-K |
    /// | `PHASERGUN_MAX_CONTEXT_TOKENS` | `150000` | Assembled-context ceiling |
    /// | `PHASERGUN_SUMMARY_WORDS` | `250` | Summary length in words |
    /// | `PHASERGUN_LOCK_STALE_MS` | `60000` | Stale-lock threshold |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_enabled = std::env::var("CACHE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let cache_dir = std::env::var("PHASERGUN_CACHE_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let mut lock = LockConfig::default();
        if let Some(stale) = read_usize("PHASERGUN_LOCK_STALE_MS") {
            lock.stale_ms = stale as u64;
        }

        Self {
            cache_enabled,
            cache_dir,
            top_k_procedures: read_usize("PHASERGUN_TOP_K_PROCEDURES")
                .unwrap_or(defaults.top_k_procedures),
            top_k_context: read_usize("PHASERGUN_TOP_K_CONTEXT").unwrap_or(defaults.top_k_context),
            include_summaries: true,
            max_context_tokens: read_usize("PHASERGUN_MAX_CONTEXT_TOKENS")
                .unwrap_or(defaults.max_context_tokens),
            summary_words: read_usize("PHASERGUN_SUMMARY_WORDS").unwrap_or(defaults.summary_words),
            embed_batch_size: defaults.embed_batch_size,
            lock,
            chunker: ChunkerConfig::default(),
        }
    }
}

fn read_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
