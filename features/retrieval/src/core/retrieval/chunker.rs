//! Domain-aware document chunking.
//!
//! Two algorithms, selected by category: procedures split on section
//! headers so retrieved excerpts align with SOP structure; context files
//! split on paragraph boundaries with a seeded overlap so narrative flows
//! across chunk edges. Both emit chunks in document order with dense
//! indices, and concatenating a document's chunks covers every
//! non-whitespace character of the source at least once.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::api::types::{Chunk, ContextCategory, DocCategory};
use crate::spi::parser::hex_prefix;

/// Chunking thresholds, in characters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Section chunks are emitted at the next header once they exceed this.
    pub section_emit_threshold: usize,
    /// Headerless sections are broken at the next paragraph boundary past this.
    pub section_hard_cap: usize,
    /// Overlap chunks are emitted once they reach this.
    pub paragraph_target: usize,
    /// No overlap chunk grows past this by appending another paragraph.
    pub paragraph_cap: usize,
    /// Tail of the previous chunk replayed at the start of the next.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            section_emit_threshold: 2000,
            section_hard_cap: 4000,
            paragraph_target: 3000,
            paragraph_cap: 4000,
            overlap: 400,
        }
    }
}

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+\S").unwrap());
static NUMBERED_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*\s+\S").unwrap());
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Whether a line opens a new section (markdown heading or numbered marker).
pub fn is_section_header(line: &str) -> bool {
    MARKDOWN_HEADING.is_match(line) || NUMBERED_HEADING.is_match(line)
}

/// Chunk one parsed document according to its category.
pub fn chunk_document(
    text: &str,
    source_path: &str,
    file_name: &str,
    category: DocCategory,
    context_category: Option<ContextCategory>,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    let pieces = match category {
        DocCategory::Procedure => section_chunks(text, config),
        DocCategory::Context => overlap_chunks(text, config),
    };

    let mut chunks = Vec::with_capacity(pieces.len());
    for piece in pieces {
        // Whitespace-only pieces are dropped; their characters are covered
        // by neighboring chunks.
        if piece.trim().is_empty() {
            continue;
        }
        let chunk_index = chunks.len();
        let content_hash = content_hash(&piece);
        let id = chunk_id(source_path, chunk_index, &content_hash);
        chunks.push(Chunk {
            id,
            source_path: source_path.to_string(),
            file_name: file_name.to_string(),
            category,
            context_category,
            chunk_index,
            text: piece,
            content_hash,
        });
    }
    chunks
}

/// Hash of a chunk's text content.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

fn chunk_id(source_path: &str, chunk_index: usize, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(b"\x00");
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(b"\x00");
    hasher.update(content_hash.as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

// ── Section-aware chunking (procedures) ─────────────────────────────

/// Accumulate lines, emitting at section headers once the chunk exceeds the
/// emit threshold, or at the next paragraph boundary once it exceeds the
/// hard cap. Documents with no headers at all fall back to the
/// overlap-paragraph algorithm.
fn section_chunks(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if !text.lines().any(is_section_header) {
        return overlap_chunks(text, config);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if is_section_header(line) && current.len() > config.section_emit_threshold {
            chunks.push(std::mem::take(&mut current));
        } else if current.len() > config.section_hard_cap && line.trim().is_empty() {
            // Runaway headerless stretch: break at the paragraph boundary.
            chunks.push(std::mem::take(&mut current));
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ── Overlap-paragraph chunking (context) ────────────────────────────

/// Split on blank lines, append paragraphs until the target is reached or
/// the cap would be exceeded, and seed each new chunk with the tail of the
/// previous one. A paragraph larger than the cap becomes its own chunk.
fn overlap_chunks(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    // Whether `current` holds anything beyond the replayed seed.
    let mut has_new = false;

    for para in PARAGRAPH_BREAK.split(text) {
        if para.trim().is_empty() {
            continue;
        }
        if para.len() >= config.paragraph_cap {
            if has_new {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(para.to_string());
            current = seed_from(para, config.overlap);
            has_new = false;
            continue;
        }

        let projected =
            if current.is_empty() { para.len() } else { current.len() + 2 + para.len() };
        if has_new && projected > config.paragraph_cap {
            let emitted = std::mem::take(&mut current);
            current = seed_from(&emitted, config.overlap);
            chunks.push(emitted);
            has_new = false;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
        has_new = true;

        if current.len() >= config.paragraph_target {
            let emitted = std::mem::take(&mut current);
            current = seed_from(&emitted, config.overlap);
            chunks.push(emitted);
            has_new = false;
        }
    }

    if has_new {
        chunks.push(current);
    }
    chunks
}

/// Last `overlap` characters of `prev`, truncated to the nearest preceding
/// whitespace so the seed never starts mid-word.
fn seed_from(prev: &str, overlap: usize) -> String {
    if overlap == 0 || prev.is_empty() {
        return String::new();
    }
    if prev.len() <= overlap {
        return prev.to_string();
    }
    let mut start = prev.len() - overlap;
    while !prev.is_char_boundary(start) {
        start += 1;
    }
    let tail = &prev[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start().to_string(),
        None => tail.to_string(),
    }
}
