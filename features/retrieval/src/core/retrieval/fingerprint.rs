//! Content fingerprints over source files and directory trees.
//!
//! A fingerprint is a SHA-256 digest whose equality implies the inputs are
//! unchanged for caching purposes. Per-file digests combine absolute path,
//! byte size, and modification time; tree digests combine per-file digests
//! in sorted relative-path order so walk order never leaks into the result.

use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::api::error::{RetrievalError, RetrievalResult};

/// Name of the `Context/` child excluded from indexing and fingerprints.
pub const PROMPT_DIR_NAME: &str = "Prompt";

/// Fingerprint a single file from its path, size, and mtime.
pub fn file_fingerprint(path: &Path) -> RetrievalResult<String> {
    let meta = std::fs::metadata(path).map_err(|e| RetrievalError::io("file stat", e))?;
    let mtime_nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(b"\x00");
    hasher.update(meta.len().to_le_bytes());
    hasher.update(mtime_nanos.to_le_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a directory tree.
///
/// Walks `root` recursively, skipping any immediate child directory whose
/// name appears in `exclude_children` (deeper directories with the same name
/// are still included). Fails with an I/O error when `root` is missing; an
/// empty tree yields a defined digest.
pub fn tree_fingerprint(root: &Path, exclude_children: &[&str]) -> RetrievalResult<String> {
    if !root.is_dir() {
        return Err(RetrievalError::io(
            "tree walk",
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory not found: {}", root.display()),
            ),
        ));
    }

    let mut files: Vec<(String, String)> = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Exclusion applies at the immediate child level only.
        if entry.depth() == 1 && entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            return !exclude_children.contains(&name.as_ref());
        }
        true
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            RetrievalError::io("tree walk", e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walk error")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let digest = file_fingerprint(entry.path())?;
        files.push((rel, digest));
    }

    // Byte-order sort on relative paths keeps the digest walk-independent.
    files.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut hasher = Sha256::new();
    for (rel, digest) in &files {
        hasher.update(rel.as_bytes());
        hasher.update(b"\x00");
        hasher.update(digest.as_bytes());
        hasher.update(b"\x01");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a whole project: the primary-context document plus the
/// `Procedures/` and `Context/` trees (excluding `Context/Prompt/`).
pub fn project_fingerprint(project_root: &Path, primary_context: &Path) -> RetrievalResult<String> {
    let primary = file_fingerprint(primary_context)?;
    let procedures = tree_fingerprint(&project_root.join("Procedures"), &[])?;
    let context = tree_fingerprint(&project_root.join("Context"), &[PROMPT_DIR_NAME])?;

    let mut hasher = Sha256::new();
    hasher.update(primary.as_bytes());
    hasher.update(b"\x00");
    hasher.update(procedures.as_bytes());
    hasher.update(b"\x00");
    hasher.update(context.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
