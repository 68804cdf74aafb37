//! In-memory vector set with deterministic cosine search and JSON
//! persistence.
//!
//! Entries are held in insertion order: all procedures first (files in
//! byte-lexicographic name order, chunks in index order), then all context
//! files the same way. Every build path honors that ordering so store
//! fingerprints are reproducible.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::error::{RetrievalError, RetrievalResult};
use crate::api::types::{Chunk, ContextCategory, DocCategory, SearchResult};

use super::persist::{read_json, write_json_atomic};

/// Two similarities closer than this are ranked by entry id instead.
const SIMILARITY_EPSILON: f32 = 1e-10;

/// A chunk paired with its L2-normalized embedding.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// The in-memory vector set for one project.
#[derive(Debug, Clone)]
pub struct VectorStore {
    project_path: String,
    model_version: String,
    created_at: String,
    entries: Vec<VectorEntry>,
}

impl VectorStore {
    pub fn new(project_path: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            model_version: model_version.into(),
            created_at: Utc::now().to_rfc3339(),
            entries: Vec::new(),
        }
    }

    /// Append one entry, preserving insertion order.
    pub fn add(&mut self, entry: VectorEntry) {
        self.entries.push(entry);
    }

    /// Append entries in input order.
    pub fn add_all(&mut self, entries: impl IntoIterator<Item = VectorEntry>) {
        for entry in entries {
            self.add(entry);
        }
    }

    pub fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Top-K cosine search over entries matching `category_filter`.
    ///
    /// Embeddings are L2-normalized, so cosine similarity reduces to a dot
    /// product. The result order is a pure function of the stored set:
    /// higher similarity first, and entries whose similarities lie within
    /// 1e-10 of each other rank by ascending entry id.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        category_filter: Option<DocCategory>,
    ) -> Vec<SearchResult> {
        if top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some(filter) = category_filter {
                if entry.chunk.category != filter {
                    continue;
                }
            }
            if entry.embedding.len() != query.len() {
                tracing::warn!(
                    entry = %entry.chunk.id,
                    entry_dim = entry.embedding.len(),
                    query_dim = query.len(),
                    "embedding dimension mismatch, scoring 0.0"
                );
                scored.push((idx, 0.0));
                continue;
            }
            let dot: f32 = query.iter().zip(entry.embedding.iter()).map(|(a, b)| a * b).sum();
            scored.push((idx, dot));
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.entries[a.0].chunk.id.cmp(&self.entries[b.0].chunk.id))
        });
        reorder_near_ties(&mut scored, &self.entries);
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, similarity)| SearchResult {
                chunk: self.entries[idx].chunk.clone(),
                similarity,
            })
            .collect()
    }

    /// Store fingerprint: content hashes in insertion order plus the model
    /// version.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.chunk.content_hash.as_bytes());
            hasher.update(b"\x00");
        }
        hasher.update(self.model_version.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Persist the store as its JSON envelope, entries in insertion order.
    pub fn save(&self, path: &Path) -> RetrievalResult<()> {
        let now = Utc::now().to_rfc3339();
        let file = StoreFile {
            project_path: self.project_path.clone(),
            entries: self.entries.iter().map(StoredEntry::from).collect(),
            fingerprint: self.fingerprint(),
            created_at: self.created_at.clone(),
            updated_at: now,
            model_version: self.model_version.clone(),
            total_entries: self.entries.len(),
        };
        write_json_atomic(path, &file)
    }

    /// Reconstruct a store from disk; file order becomes insertion order.
    pub fn load(path: &Path) -> RetrievalResult<VectorStore> {
        let file: StoreFile = read_json(path)?.ok_or_else(|| {
            RetrievalError::CacheCorrupt(format!("missing vector store: {}", path.display()))
        })?;

        let mut store = VectorStore {
            project_path: file.project_path,
            model_version: file.model_version,
            created_at: file.created_at,
            entries: Vec::with_capacity(file.entries.len()),
        };
        for stored in file.entries {
            store.entries.push(stored.into_entry());
        }
        Ok(store)
    }
}

/// After the primary similarity sort, re-rank each run of near-equal
/// similarities by entry id. An epsilon relation is not transitive, so this
/// runs as a grouped post-pass rather than inside the comparison sort.
fn reorder_near_ties(scored: &mut [(usize, f32)], entries: &[VectorEntry]) {
    let mut start = 0;
    while start < scored.len() {
        let head = scored[start].1;
        let mut end = start + 1;
        while end < scored.len() && (head - scored[end].1).abs() < SIMILARITY_EPSILON {
            end += 1;
        }
        if end - start > 1 {
            scored[start..end]
                .sort_by(|a, b| entries[a.0].chunk.id.cmp(&entries[b.0].chunk.id));
        }
        start = end;
    }
}

// ── On-disk envelope ────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    project_path: String,
    entries: Vec<StoredEntry>,
    fingerprint: String,
    created_at: String,
    updated_at: String,
    model_version: String,
    total_entries: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    id: String,
    embedding: Vec<f32>,
    metadata: StoredMetadata,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMetadata {
    file_name: String,
    file_path: String,
    category: DocCategory,
    chunk_index: usize,
    content: String,
    content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_category: Option<ContextCategory>,
}

impl From<&VectorEntry> for StoredEntry {
    fn from(entry: &VectorEntry) -> Self {
        StoredEntry {
            id: entry.chunk.id.clone(),
            embedding: entry.embedding.clone(),
            metadata: StoredMetadata {
                file_name: entry.chunk.file_name.clone(),
                file_path: entry.chunk.source_path.clone(),
                category: entry.chunk.category,
                chunk_index: entry.chunk.chunk_index,
                content: entry.chunk.text.clone(),
                content_hash: entry.chunk.content_hash.clone(),
                context_category: entry.chunk.context_category,
            },
        }
    }
}

impl StoredEntry {
    fn into_entry(self) -> VectorEntry {
        VectorEntry {
            chunk: Chunk {
                id: self.id,
                source_path: self.metadata.file_path,
                file_name: self.metadata.file_name,
                category: self.metadata.category,
                context_category: self.metadata.context_category,
                chunk_index: self.metadata.chunk_index,
                text: self.metadata.content,
                content_hash: self.metadata.content_hash,
            },
            embedding: self.embedding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, category: DocCategory, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_path: format!("Procedures/{id}.md"),
            file_name: format!("{id}.md"),
            category,
            context_category: None,
            chunk_index: 0,
            text: text.to_string(),
            content_hash: super::super::chunker::content_hash(text),
        }
    }

    fn entry(id: &str, category: DocCategory, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry { chunk: chunk(id, category, id), embedding }
    }

    #[test]
    fn search_ranks_by_similarity() {
        let mut store = VectorStore::new("/p", "test-model");
        store.add(entry("a", DocCategory::Procedure, vec![1.0, 0.0]));
        store.add(entry("b", DocCategory::Procedure, vec![0.0, 1.0]));
        store.add(entry("c", DocCategory::Procedure, vec![0.7071, 0.7071]));

        let results = store.search(&[1.0, 0.0], 3, None);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[test]
    fn exact_ties_rank_by_id() {
        let mut store = VectorStore::new("/p", "test-model");
        // Insert in reverse id order; identical vectors give identical sims.
        store.add(entry("zz", DocCategory::Procedure, vec![1.0, 0.0]));
        store.add(entry("aa", DocCategory::Procedure, vec![1.0, 0.0]));
        store.add(entry("mm", DocCategory::Procedure, vec![1.0, 0.0]));

        let results = store.search(&[1.0, 0.0], 3, None);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "mm", "zz"]);
    }

    #[test]
    fn near_ties_within_epsilon_rank_by_id() {
        let mut store = VectorStore::new("/p", "test-model");
        // Similarities 5e-11 and 0.0 differ by less than the 1e-10 window,
        // so the raw similarity order (zz first) is overridden by id order.
        store.add(entry("zz", DocCategory::Procedure, vec![5e-11, 1.0]));
        store.add(entry("aa", DocCategory::Procedure, vec![0.0, 1.0]));

        let results = store.search(&[1.0, 0.0], 2, None);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "zz"]);
    }

    #[test]
    fn category_filter_restricts_results() {
        let mut store = VectorStore::new("/p", "test-model");
        store.add(entry("proc", DocCategory::Procedure, vec![1.0, 0.0]));
        store.add(entry("ctx", DocCategory::Context, vec![1.0, 0.0]));

        let results = store.search(&[1.0, 0.0], 10, Some(DocCategory::Context));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "ctx");
    }

    #[test]
    fn top_k_zero_returns_nothing() {
        let mut store = VectorStore::new("/p", "test-model");
        store.add(entry("a", DocCategory::Procedure, vec![1.0, 0.0]));
        assert!(store.search(&[1.0, 0.0], 0, None).is_empty());
    }

    #[test]
    fn fingerprint_reflects_order_and_model() {
        let mut one = VectorStore::new("/p", "m1");
        one.add(entry("a", DocCategory::Procedure, vec![1.0]));
        one.add(entry("b", DocCategory::Procedure, vec![1.0]));

        let mut same = VectorStore::new("/p", "m1");
        same.add(entry("a", DocCategory::Procedure, vec![1.0]));
        same.add(entry("b", DocCategory::Procedure, vec![1.0]));
        assert_eq!(one.fingerprint(), same.fingerprint());

        let mut reversed = VectorStore::new("/p", "m1");
        reversed.add(entry("b", DocCategory::Procedure, vec![1.0]));
        reversed.add(entry("a", DocCategory::Procedure, vec![1.0]));
        assert_ne!(one.fingerprint(), reversed.fingerprint());

        let mut other_model = VectorStore::new("/p", "m2");
        other_model.add(entry("a", DocCategory::Procedure, vec![1.0]));
        other_model.add(entry("b", DocCategory::Procedure, vec![1.0]));
        assert_ne!(one.fingerprint(), other_model.fingerprint());
    }

    #[test]
    fn save_load_roundtrip_preserves_order_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector-store.json");

        let mut store = VectorStore::new("/p", "test-model");
        store.add(entry("b", DocCategory::Procedure, vec![0.0, 1.0]));
        store.add(entry("a", DocCategory::Context, vec![1.0, 0.0]));
        store.save(&path).unwrap();

        let loaded = VectorStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[0].chunk.id, "b");
        assert_eq!(loaded.entries()[1].chunk.id, "a");
        assert_eq!(loaded.fingerprint(), store.fingerprint());
        assert_eq!(loaded.model_version(), "test-model");
    }

    #[test]
    fn load_of_garbage_is_cache_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector-store.json");
        std::fs::write(&path, "truncated {").unwrap();

        let err = VectorStore::load(&path).unwrap_err();
        assert_eq!(err.kind(), "cache_corrupt");
    }

    #[test]
    fn persisted_schema_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector-store.json");

        let mut store = VectorStore::new("/p", "test-model");
        store.add(entry("a", DocCategory::Procedure, vec![1.0]));
        store.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        for field in [
            "projectPath",
            "modelVersion",
            "totalEntries",
            "createdAt",
            "updatedAt",
            "fileName",
            "filePath",
            "chunkIndex",
            "contentHash",
        ] {
            assert!(raw.contains(field), "missing field {field}: {raw}");
        }
        assert!(!raw.contains("contextCategory"), "absent option must be omitted");
    }
}
