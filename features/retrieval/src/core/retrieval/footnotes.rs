//! Deduplicated citation numbering.
//!
//! One tracker per generation request. Every retrieved chunk and every
//! recognized regulatory standard gets a sequential citation id; repeats
//! return the id already assigned.

use std::collections::HashMap;

use crate::api::types::{DocCategory, Reference};

/// What a footnote points at.
#[derive(Debug, Clone)]
pub enum FootnoteKind {
    /// A retrieved chunk of a project document.
    Chunk { category: DocCategory, file_name: String, chunk_index: usize },
    /// A recognized regulatory standard.
    Standard { name: String, description: String },
}

/// One numbered citation.
#[derive(Debug, Clone)]
pub struct FootnoteEntry {
    /// 1-based citation id, dense in assignment order.
    pub id: usize,
    pub kind: FootnoteKind,
}

/// Assigns and renders citation numbers, deduplicating by source key.
#[derive(Debug, Default)]
pub struct FootnoteTracker {
    entries: Vec<FootnoteEntry>,
    index: HashMap<String, usize>,
}

impl FootnoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a retrieved chunk; returns its citation id, reusing any id
    /// already assigned to the same `(category, file, chunk)` key.
    pub fn add_chunk(&mut self, category: DocCategory, file_name: &str, chunk_index: usize) -> usize {
        let key = format!("{category}|{file_name}|{chunk_index}");
        self.add(
            key,
            FootnoteKind::Chunk {
                category,
                file_name: file_name.to_string(),
                chunk_index,
            },
        )
    }

    /// Register a regulatory standard; same dedup rule as chunks.
    pub fn add_standard(&mut self, name: &str, description: &str) -> usize {
        let key = format!("standard|{name}");
        self.add(
            key,
            FootnoteKind::Standard { name: name.to_string(), description: description.to_string() },
        )
    }

    fn add(&mut self, key: String, kind: FootnoteKind) -> usize {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.entries.len() + 1;
        self.entries.push(FootnoteEntry { id, kind });
        self.index.insert(key, id);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FootnoteEntry] {
        &self.entries
    }

    /// Render the Markdown sources block, one line per id in assignment
    /// order.
    pub fn render(&self) -> String {
        let mut out = String::from("## Sources\n");
        for entry in &self.entries {
            match &entry.kind {
                FootnoteKind::Chunk { category, file_name, chunk_index } => {
                    let kind = match category {
                        DocCategory::Procedure => "Procedure",
                        DocCategory::Context => "Context",
                    };
                    out.push_str(&format!(
                        "[{}] {}: {} (Section {})\n",
                        entry.id, kind, file_name, chunk_index
                    ));
                }
                FootnoteKind::Standard { name, description } => {
                    out.push_str(&format!(
                        "[{}] Regulatory Standard: {} — {}\n",
                        entry.id, name, description
                    ));
                }
            }
        }
        out
    }

    /// Citation list in assignment order, for the response envelope.
    pub fn references(&self) -> Vec<Reference> {
        self.entries
            .iter()
            .map(|entry| match &entry.kind {
                FootnoteKind::Chunk { category, file_name, chunk_index } => Reference {
                    id: entry.id,
                    kind: match category {
                        DocCategory::Procedure => "Procedure".to_string(),
                        DocCategory::Context => "Context".to_string(),
                    },
                    label: format!("{file_name} (Section {chunk_index})"),
                },
                FootnoteKind::Standard { name, description } => Reference {
                    id: entry.id,
                    kind: "Regulatory Standard".to_string(),
                    label: format!("{name} — {description}"),
                },
            })
            .collect()
    }

    /// Drop all entries and restart numbering from 1.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
