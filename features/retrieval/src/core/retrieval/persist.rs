//! Atomic JSON persistence helpers.
//!
//! Every cache artifact is written as write-to-temp + rename within the same
//! directory, so readers only ever observe absent or complete files.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::error::{RetrievalError, RetrievalResult};

/// Serialize `value` to JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> RetrievalResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RetrievalError::io("cache dir", e))?;
    }
    let json = serde_json::to_string(value).map_err(|e| {
        RetrievalError::io("cache serialize", std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let tmp = temp_sibling(path);
    std::fs::write(&tmp, json).map_err(|e| RetrievalError::io("cache write", e))?;
    std::fs::rename(&tmp, path).map_err(|e| RetrievalError::io("cache rename", e))?;
    Ok(())
}

/// Read and deserialize a JSON file. Missing files are `Ok(None)`;
/// unreadable or malformed files are `CacheCorrupt`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> RetrievalResult<Option<T>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RetrievalError::CacheCorrupt(format!("{}: {e}", path.display())));
        }
    };
    let value = serde_json::from_str(&raw)
        .map_err(|e| RetrievalError::CacheCorrupt(format!("{}: {e}", path.display())))?;
    Ok(Some(value))
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
