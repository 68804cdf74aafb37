//! Cross-process build lock with stale detection.
//!
//! A lock is an exclusively created file. Holders that crash leave the file
//! behind; a lock older than `stale_ms` is treated as abandoned and removed.
//! Contending acquirers retry with randomized exponential backoff.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::api::error::{RetrievalError, RetrievalResult};

/// Lock acquisition behavior.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Age in milliseconds past which an existing lock counts as abandoned.
    pub stale_ms: u64,
    /// Retries before giving up.
    pub max_retries: u32,
    /// Lower bound of the backoff window in milliseconds.
    pub min_backoff_ms: u64,
    /// Upper bound of the backoff window in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { stale_ms: 60_000, max_retries: 10, min_backoff_ms: 500, max_backoff_ms: 3000 }
    }
}

/// An exclusive cross-process lock backed by a lock file.
///
/// `release` must run on all exit paths; `Drop` covers the ones that
/// forget. Release is idempotent.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    released: bool,
}

impl BuildLock {
    /// Acquire the lock at `path`, creating parent directories as needed.
    pub async fn acquire(path: &Path, config: &LockConfig) -> RetrievalResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RetrievalError::io("lock dir", e))?;
        }

        let mut attempt: u32 = 0;
        loop {
            match OpenOptions::new().create_new(true).write(true).open(path) {
                Ok(mut file) => {
                    let _ = write_lock_metadata(&mut file);
                    let _ = file.sync_all();
                    tracing::debug!(path = %path.display(), "build lock acquired");
                    return Ok(Self { path: path.to_path_buf(), released: false });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path, config.stale_ms) {
                        tracing::warn!(path = %path.display(), "removing stale build lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if attempt >= config.max_retries {
                        return Err(RetrievalError::LockAcquisition {
                            path: path.display().to_string(),
                            reason: format!("still held after {attempt} retries"),
                        });
                    }
                    let delay = backoff_delay(config, attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(RetrievalError::io("lock create", e)),
            }
        }
    }

    /// Remove the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            let _ = std::fs::remove_file(&self.path);
            tracing::debug!(path = %self.path.display(), "build lock released");
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Randomized exponential backoff: the window doubles from `min_backoff_ms`
/// per attempt, capped at `max_backoff_ms`, and the delay is drawn uniformly
/// from `[min_backoff_ms, window]`.
fn backoff_delay(config: &LockConfig, attempt: u32) -> Duration {
    let window = config
        .min_backoff_ms
        .saturating_mul(1u64 << attempt.min(16))
        .clamp(config.min_backoff_ms, config.max_backoff_ms.max(config.min_backoff_ms));
    let ms = rand::thread_rng().gen_range(config.min_backoff_ms..=window);
    Duration::from_millis(ms)
}

fn write_lock_metadata(file: &mut std::fs::File) -> std::io::Result<()> {
    let pid = std::process::id();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    writeln!(file, "pid={pid}")?;
    writeln!(file, "acquired_at_ms={now}")
}

fn is_stale(path: &Path, stale_ms: u64) -> bool {
    let age = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(mtime) => SystemTime::now().duration_since(mtime).unwrap_or(Duration::ZERO),
        Err(_) => return false,
    };
    age > Duration::from_millis(stale_ms)
}
