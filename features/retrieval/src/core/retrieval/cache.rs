//! Fingerprint-validated cache lifecycle.
//!
//! The coordinator owns the on-disk cache for every project this process
//! touches. A cache entry moves MISSING → BUILDING → VALID; a fingerprint
//! mismatch makes it STALE and a load error makes it MISSING again. Builds
//! are serialized by a per-project async mutex in-process and by a lock file
//! across processes, with validity re-checked inside both regions so peers
//! that finish first win. Metadata is always written last: a reader that
//! finds `cache-metadata.json` may trust the other three files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::error::{RetrievalError, RetrievalResult};
use crate::api::types::{ContextCategory, DocCategory, FileSummary};
use crate::spi::config::RetrievalConfig;
use crate::spi::embedding::EmbeddingProvider;
use crate::spi::parser::{hex_prefix, DocumentParser};

use super::chunker::{chunk_document, ChunkerConfig};
use super::embedder::{embed_in_batches, EmbeddingMemo};
use super::fingerprint::{project_fingerprint, PROMPT_DIR_NAME};
use super::lock::{BuildLock, LockConfig};
use super::persist::{read_json, write_json_atomic};
use super::store::{VectorEntry, VectorStore};
use super::summary::{load_summaries, save_summaries, summarize_or_reuse};

/// A fully built, immutable retrieval cache for one project.
#[derive(Debug)]
pub struct CacheEntry {
    pub store: VectorStore,
    pub sop_summaries: BTreeMap<String, FileSummary>,
    pub context_summaries: BTreeMap<String, FileSummary>,
    /// Project fingerprint this entry was built against.
    pub fingerprint: String,
    /// Fingerprint of the vector store contents.
    pub store_fingerprint: String,
    pub built_at: String,
    pub model_version: String,
}

/// Short hash keying a project's cache directories.
pub fn project_hash(project_root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_root.to_string_lossy().as_bytes());
    hex_prefix(&hasher.finalize(), 8)
}

/// On-disk layout for one project's cache.
#[derive(Debug, Clone)]
struct CachePaths {
    vector_store: PathBuf,
    sop_summaries: PathBuf,
    context_summaries: PathBuf,
    metadata: PathBuf,
    lock: PathBuf,
    embeddings_dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheMetadata {
    project_path: String,
    fingerprint: String,
    vector_store_fingerprint: String,
    indexed_at: String,
    model_version: String,
}

/// Coordinates in-memory and on-disk caches for all projects.
pub struct CacheCoordinator {
    cache_root: PathBuf,
    cache_enabled: bool,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: ChunkerConfig,
    lock_config: LockConfig,
    summary_words: usize,
    embed_batch_size: usize,
    /// Published VALID entries; reads are lock-free apart from the map lock.
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    /// One build mutex per project, shared by all requests in this process.
    build_mutexes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheCoordinator {
    pub fn new(
        config: &RetrievalConfig,
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            cache_root: config.cache_dir.clone(),
            cache_enabled: config.cache_enabled,
            parser,
            embedder,
            chunker: config.chunker.clone(),
            lock_config: config.lock.clone(),
            summary_words: config.summary_words,
            embed_batch_size: config.embed_batch_size,
            entries: RwLock::new(HashMap::new()),
            build_mutexes: Mutex::new(HashMap::new()),
        }
    }

    /// Return the VALID cache entry for `project_root`, loading or building
    /// it as needed.
    pub async fn get_or_build(
        &self,
        project_root: &Path,
        primary_context: &Path,
    ) -> RetrievalResult<Arc<CacheEntry>> {
        let root = absolutize(project_root);
        let hash = project_hash(&root);
        let fingerprint = project_fingerprint(&root, primary_context)?;
        let paths = self.paths(&hash);

        if let Some(entry) = self.memory_hit(&hash, &fingerprint) {
            return Ok(entry);
        }
        if self.cache_enabled {
            if let Some(entry) = self.try_load_disk(&paths, &fingerprint) {
                return Ok(self.publish(&hash, entry));
            }
        }

        let build_mutex = self.build_mutex(&hash);
        let _in_process = build_mutex.lock().await;

        // Double-checked: a peer request may have finished while we waited.
        if let Some(entry) = self.memory_hit(&hash, &fingerprint) {
            return Ok(entry);
        }
        if self.cache_enabled {
            if let Some(entry) = self.try_load_disk(&paths, &fingerprint) {
                return Ok(self.publish(&hash, entry));
            }

            let _file_lock = BuildLock::acquire(&paths.lock, &self.lock_config).await?;

            // Re-check once more: a peer process may have published.
            if let Some(entry) = self.try_load_disk(&paths, &fingerprint) {
                return Ok(self.publish(&hash, entry));
            }

            let entry = self.build_entry(&root, &paths, &fingerprint).await?;
            self.persist_entry(&root, &paths, &entry)?;
            return Ok(self.publish(&hash, entry));
        }

        // Cache disabled: build in memory only, nothing touches disk.
        let entry = self.build_entry(&root, &paths, &fingerprint).await?;
        Ok(self.publish(&hash, entry))
    }

    // ── Lookup paths ────────────────────────────────────────────────

    fn memory_hit(&self, hash: &str, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read();
        let entry = entries.get(hash)?;
        if entry.fingerprint == fingerprint {
            tracing::debug!(project = hash, "cache hit (memory)");
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Load a VALID entry from disk, or `None` when the cache is missing,
    /// stale, or corrupt. Corruption is logged and treated as missing so the
    /// same request rebuilds.
    fn try_load_disk(&self, paths: &CachePaths, fingerprint: &str) -> Option<CacheEntry> {
        let metadata: CacheMetadata = match read_json(&paths.metadata) {
            Ok(Some(m)) => m,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "corrupt cache metadata, rebuilding");
                return None;
            }
        };
        if metadata.fingerprint != fingerprint {
            tracing::debug!("cache fingerprint mismatch, rebuilding");
            return None;
        }
        if metadata.model_version != self.embedder.model_version() {
            tracing::debug!(
                cached = %metadata.model_version,
                current = %self.embedder.model_version(),
                "cache built by a different model, rebuilding"
            );
            return None;
        }

        let store = match VectorStore::load(&paths.vector_store) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "corrupt vector store, rebuilding");
                return None;
            }
        };
        if store.fingerprint() != metadata.vector_store_fingerprint {
            tracing::warn!("vector store fingerprint mismatch, rebuilding");
            return None;
        }

        let sop_summaries = match load_summaries(&paths.sop_summaries) {
            Ok(Some(map)) => map,
            other => {
                log_summary_problem("sop", other.err());
                return None;
            }
        };
        let context_summaries = match load_summaries(&paths.context_summaries) {
            Ok(Some(map)) => map,
            other => {
                log_summary_problem("context", other.err());
                return None;
            }
        };

        tracing::debug!("cache hit (disk)");
        Some(CacheEntry {
            store_fingerprint: metadata.vector_store_fingerprint,
            fingerprint: metadata.fingerprint,
            built_at: metadata.indexed_at,
            model_version: metadata.model_version,
            store,
            sop_summaries,
            context_summaries,
        })
    }

    fn publish(&self, hash: &str, entry: impl Into<Arc<CacheEntry>>) -> Arc<CacheEntry> {
        let arc: Arc<CacheEntry> = entry.into();
        self.entries.write().insert(hash.to_string(), arc.clone());
        arc
    }

    fn build_mutex(&self, hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.build_mutexes
            .lock()
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn paths(&self, hash: &str) -> CachePaths {
        CachePaths {
            vector_store: self.cache_root.join("vector-store").join(hash).join("vector-store.json"),
            sop_summaries: self
                .cache_root
                .join("sop-summaries")
                .join(hash)
                .join("sop-summaries.json"),
            context_summaries: self
                .cache_root
                .join("context-summaries")
                .join(hash)
                .join("context-summaries.json"),
            metadata: self.cache_root.join("metadata").join(hash).join("cache-metadata.json"),
            lock: self.cache_root.join("locks").join(hash).join("cache-build.lock"),
            embeddings_dir: self.cache_root.join("embeddings").join(hash),
        }
    }

    // ── Build ───────────────────────────────────────────────────────

    async fn build_entry(
        &self,
        root: &Path,
        paths: &CachePaths,
        fingerprint: &str,
    ) -> RetrievalResult<CacheEntry> {
        let sources = enumerate_sources(root)?;
        let model_version = self.embedder.model_version().to_string();
        tracing::info!(
            project = %root.display(),
            files = sources.len(),
            "building retrieval cache"
        );

        // Previous summaries survive per-file when their content hash still
        // matches.
        let previous_sop = self.previous_summaries(&paths.sop_summaries);
        let previous_context = self.previous_summaries(&paths.context_summaries);

        let mut sop_summaries = BTreeMap::new();
        let mut context_summaries = BTreeMap::new();
        let mut chunks = Vec::new();

        for source in &sources {
            let doc = match self.parser.parse(&source.abs).await {
                Some(doc) => doc,
                None => {
                    tracing::warn!(path = %source.abs.display(), "unparseable file skipped");
                    continue;
                }
            };

            match source.category {
                DocCategory::Procedure => {
                    let prev = previous_sop.get(&source.file_name);
                    sop_summaries.insert(
                        source.file_name.clone(),
                        summarize_or_reuse(&doc, prev, self.summary_words),
                    );
                }
                DocCategory::Context => {
                    let prev = previous_context.get(&source.file_name);
                    context_summaries.insert(
                        source.file_name.clone(),
                        summarize_or_reuse(&doc, prev, self.summary_words),
                    );
                }
            }

            chunks.extend(chunk_document(
                &doc.text,
                &source.rel,
                &source.file_name,
                source.category,
                source.context_category,
                &self.chunker,
            ));
        }

        let embeddings = self.embed_chunks(&chunks, paths, &model_version).await?;

        let mut store = VectorStore::new(root.to_string_lossy(), model_version.clone());
        store.add_all(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorEntry { chunk, embedding }),
        );

        let store_fingerprint = store.fingerprint();
        tracing::info!(
            entries = store.len(),
            store_fingerprint = %store_fingerprint,
            "retrieval cache built"
        );

        Ok(CacheEntry {
            store,
            sop_summaries,
            context_summaries,
            fingerprint: fingerprint.to_string(),
            store_fingerprint,
            built_at: Utc::now().to_rfc3339(),
            model_version,
        })
    }

    /// Embed chunk texts in document order, consulting the on-disk memo
    /// first. Only memo misses reach the model.
    async fn embed_chunks(
        &self,
        chunks: &[crate::api::types::Chunk],
        paths: &CachePaths,
        model_version: &str,
    ) -> RetrievalResult<Vec<Vec<f32>>> {
        let memo = self.cache_enabled.then(|| EmbeddingMemo::new(paths.embeddings_dir.clone()));

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut miss_indexes = Vec::new();
        let mut miss_texts = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let cached = memo.as_ref().and_then(|m| {
                m.load(&EmbeddingMemo::key(&chunk.source_path, &chunk.content_hash, model_version))
            });
            match cached {
                Some(v) => vectors.push(Some(v)),
                None => {
                    vectors.push(None);
                    miss_indexes.push(idx);
                    miss_texts.push(chunk.text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            tracing::debug!(
                total = chunks.len(),
                misses = miss_texts.len(),
                "embedding chunks not found in memo"
            );
            let fresh =
                embed_in_batches(self.embedder.as_ref(), &miss_texts, self.embed_batch_size)
                    .await?;
            for (slot, vector) in miss_indexes.into_iter().zip(fresh) {
                if let Some(m) = memo.as_ref() {
                    let chunk = &chunks[slot];
                    m.store(
                        &EmbeddingMemo::key(&chunk.source_path, &chunk.content_hash, model_version),
                        &vector,
                    );
                }
                vectors[slot] = Some(vector);
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    /// Write the three data files, then the metadata last so its presence
    /// certifies the rest.
    fn persist_entry(
        &self,
        root: &Path,
        paths: &CachePaths,
        entry: &CacheEntry,
    ) -> RetrievalResult<()> {
        entry.store.save(&paths.vector_store)?;
        save_summaries(&paths.sop_summaries, &entry.sop_summaries)?;
        save_summaries(&paths.context_summaries, &entry.context_summaries)?;
        write_json_atomic(
            &paths.metadata,
            &CacheMetadata {
                project_path: root.to_string_lossy().to_string(),
                fingerprint: entry.fingerprint.clone(),
                vector_store_fingerprint: entry.store_fingerprint.clone(),
                indexed_at: entry.built_at.clone(),
                model_version: entry.model_version.clone(),
            },
        )
    }

    fn previous_summaries(&self, path: &Path) -> BTreeMap<String, FileSummary> {
        if !self.cache_enabled {
            return BTreeMap::new();
        }
        load_summaries(path).ok().flatten().unwrap_or_default()
    }
}

fn log_summary_problem(which: &str, err: Option<RetrievalError>) {
    match err {
        Some(e) => tracing::warn!(which, error = %e, "corrupt summaries, rebuilding"),
        None => tracing::warn!(which, "summaries missing despite metadata, rebuilding"),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ── Source enumeration ──────────────────────────────────────────────

#[derive(Debug)]
struct SourceFile {
    abs: PathBuf,
    rel: String,
    file_name: String,
    category: DocCategory,
    context_category: Option<ContextCategory>,
}

/// Discover indexable files: everything under `Procedures/`, then
/// everything under `Context/` except the immediate `Prompt/` child. Within
/// each category, files sort by name in byte order (ties broken by relative
/// path) so build output is walk-order independent.
fn enumerate_sources(root: &Path) -> RetrievalResult<Vec<SourceFile>> {
    let mut procedures = collect_tree(root, &root.join("Procedures"), DocCategory::Procedure, &[])?;
    let mut context =
        collect_tree(root, &root.join("Context"), DocCategory::Context, &[PROMPT_DIR_NAME])?;

    let by_name = |a: &SourceFile, b: &SourceFile| {
        a.file_name
            .as_bytes()
            .cmp(b.file_name.as_bytes())
            .then_with(|| a.rel.as_bytes().cmp(b.rel.as_bytes()))
    };
    procedures.sort_by(by_name);
    context.sort_by(by_name);

    procedures.extend(context);
    Ok(procedures)
}

fn collect_tree(
    root: &Path,
    tree: &Path,
    category: DocCategory,
    exclude_children: &[&str],
) -> RetrievalResult<Vec<SourceFile>> {
    if !tree.is_dir() {
        return Err(RetrievalError::io(
            "source enumeration",
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory not found: {}", tree.display()),
            ),
        ));
    }

    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(tree).into_iter().filter_entry(|entry| {
        if entry.depth() == 1 && entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            return !exclude_children.contains(&name.as_ref());
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "walk error, file skipped");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let file_name = entry.file_name().to_string_lossy().to_string();

        // The context label comes from the immediate subfolder, when it is
        // one of the fixed set.
        let context_category = if category == DocCategory::Context {
            entry
                .path()
                .strip_prefix(tree)
                .ok()
                .and_then(|p| p.components().next())
                .and_then(|c| match c {
                    std::path::Component::Normal(name) if entry.depth() > 1 => {
                        ContextCategory::from_folder(&name.to_string_lossy())
                    }
                    _ => None,
                })
        } else {
            None
        };

        files.push(SourceFile {
            abs: entry.path().to_path_buf(),
            rel,
            file_name,
            category,
            context_category,
        });
    }
    Ok(files)
}
