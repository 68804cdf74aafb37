//! Extractive first-N-words summaries, keyed per file by content hash.
//!
//! Summaries are deterministic and LLM-free: the first N whitespace tokens
//! of the source, joined by single spaces. The per-file content hash lets
//! unchanged files keep their summaries across rebuilds.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::error::RetrievalResult;
use crate::api::types::FileSummary;
use crate::spi::parser::ParsedDocument;

use super::chunker::content_hash;
use super::persist::{read_json, write_json_atomic};

/// Default summary length in whitespace tokens.
pub const DEFAULT_SUMMARY_WORDS: usize = 250;

/// Summarize one document: first `max_words` whitespace tokens, internal
/// whitespace normalized to single spaces.
pub fn summarize(doc: &ParsedDocument, max_words: usize) -> FileSummary {
    let first_words: Vec<&str> = doc.text.split_whitespace().take(max_words).collect();
    FileSummary {
        file_name: doc.file_name.clone(),
        content_hash: content_hash(&doc.text),
        first_words: first_words.join(" "),
        generated_at: Utc::now().to_rfc3339(),
    }
}

/// Carry forward a previous summary when the source is unchanged, else
/// summarize afresh. The full cache rebuilds on any fingerprint change, so
/// this per-file hash guard is belt-and-braces.
pub fn summarize_or_reuse(
    doc: &ParsedDocument,
    previous: Option<&FileSummary>,
    max_words: usize,
) -> FileSummary {
    if let Some(prev) = previous {
        if prev.content_hash == content_hash(&doc.text) {
            return prev.clone();
        }
    }
    summarize(doc, max_words)
}

// ── Persistence ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRecord {
    hash: String,
    summary: String,
    generated_at: String,
}

/// Write a summary map as `fileName → {hash, summary, generatedAt}`.
pub fn save_summaries(path: &Path, summaries: &BTreeMap<String, FileSummary>) -> RetrievalResult<()> {
    let records: BTreeMap<&str, SummaryRecord> = summaries
        .iter()
        .map(|(name, s)| {
            (
                name.as_str(),
                SummaryRecord {
                    hash: s.content_hash.clone(),
                    summary: s.first_words.clone(),
                    generated_at: s.generated_at.clone(),
                },
            )
        })
        .collect();
    write_json_atomic(path, &records)
}

/// Load a summary map; `None` when the file does not exist, `CacheCorrupt`
/// when it exists but cannot be read.
pub fn load_summaries(path: &Path) -> RetrievalResult<Option<BTreeMap<String, FileSummary>>> {
    let records: Option<BTreeMap<String, SummaryRecord>> = read_json(path)?;
    Ok(records.map(|map| {
        map.into_iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    FileSummary {
                        file_name: name,
                        content_hash: r.hash,
                        first_words: r.summary,
                        generated_at: r.generated_at,
                    },
                )
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn doc(name: &str, text: &str) -> ParsedDocument {
        ParsedDocument {
            id: "abc123".to_string(),
            absolute_path: std::path::PathBuf::from(format!("/p/{name}")),
            file_name: name.to_string(),
            text: text.to_string(),
            mime_type: "text/markdown".to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn takes_first_n_words_with_normalized_whitespace() {
        let text = "one  two\tthree\n\nfour five six";
        let summary = summarize(&doc("a.md", text), 4);
        assert_eq!(summary.first_words, "one two three four");
    }

    #[test]
    fn short_documents_summarize_whole_text() {
        let summary = summarize(&doc("a.md", "just a few words"), 250);
        assert_eq!(summary.first_words, "just a few words");
    }

    #[test]
    fn unchanged_files_keep_their_summary() {
        let original = summarize(&doc("a.md", "stable content here"), 250);
        let reused = summarize_or_reuse(&doc("a.md", "stable content here"), Some(&original), 250);
        assert_eq!(reused.generated_at, original.generated_at);

        let changed = summarize_or_reuse(&doc("a.md", "different content now"), Some(&original), 250);
        assert_eq!(changed.first_words, "different content now");
        assert_ne!(changed.content_hash, original.content_hash);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sop-summaries.json");

        let mut summaries = Map::new();
        let s = summarize(&doc("SOP-001.md", "the purpose of this procedure"), 250);
        summaries.insert(s.file_name.clone(), s);
        save_summaries(&path, &summaries).unwrap();

        let loaded = load_summaries(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded["SOP-001.md"];
        assert_eq!(got.first_words, "the purpose of this procedure");
        assert_eq!(got.file_name, "SOP-001.md");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("generatedAt"));
        assert!(raw.contains("\"hash\""));
    }

    #[test]
    fn missing_summary_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_summaries(&dir.path().join("absent.json")).unwrap().is_none());
    }
}
