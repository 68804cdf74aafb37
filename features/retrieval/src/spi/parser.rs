//! Document parsing SPI.
//!
//! Rich-format parsing (PDF, Office, OCR) lives outside the core behind the
//! [`DocumentParser`] trait. The bundled [`PlainTextParser`] covers the text
//! formats the core can read on its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

// ── Data types ──────────────────────────────────────────────────────

/// A parsed source document, immutable within a run.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Stable short hash of the absolute path.
    pub id: String,
    /// Absolute path of the source file.
    pub absolute_path: PathBuf,
    /// Bare file name.
    pub file_name: String,
    /// Extracted text content.
    pub text: String,
    /// Best-effort MIME type.
    pub mime_type: String,
    /// Parser-specific metadata.
    pub metadata: BTreeMap<String, String>,
}

// ── Parser trait ────────────────────────────────────────────────────

/// Extracts text from source documents.
///
/// Returns `None` for unsupported or unreadable files; the caller logs and
/// skips those during index builds.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file at `path`, or `None` if this parser cannot handle it.
    async fn parse(&self, path: &Path) -> Option<ParsedDocument>;
}

// ── PlainTextParser ─────────────────────────────────────────────────

/// Parser for plain-text and markup formats readable without external tools.
#[derive(Debug, Default, Clone)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }

    fn mime_for(ext: &str) -> Option<&'static str> {
        match ext {
            "md" | "markdown" => Some("text/markdown"),
            "txt" | "text" => Some("text/plain"),
            "rst" => Some("text/x-rst"),
            "adoc" | "asciidoc" => Some("text/asciidoc"),
            _ => None,
        }
    }
}

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, path: &Path) -> Option<ParsedDocument> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let mime = Self::mime_for(&ext)?;

        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable document, skipping");
                return None;
            }
        };

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .unwrap_or_default();

        Some(ParsedDocument {
            id: document_id(path),
            absolute_path: path.to_path_buf(),
            file_name,
            text,
            mime_type: mime.to_string(),
            metadata: BTreeMap::new(),
        })
    }
}

/// Stable short hash of a document's absolute path.
pub fn document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 12)
}

/// Render the first `n` hex characters of a digest.
pub(crate) fn hex_prefix(digest: &[u8], n: usize) -> String {
    let mut out = String::with_capacity(n);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= n {
            break;
        }
    }
    out.truncate(n);
    out
}
