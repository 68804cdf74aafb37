//! Data types shared across the retrieval pipeline and its consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Categories ──────────────────────────────────────────────────────

/// The two retrieval buckets: procedures are SOPs, context is
/// project-specific material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocCategory {
    /// Procedural SOP documents under `Procedures/`.
    Procedure,
    /// Project context documents under `Context/`.
    Context,
}

impl std::fmt::Display for DocCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocCategory::Procedure => write!(f, "procedure"),
            DocCategory::Context => write!(f, "context"),
        }
    }
}

/// Fixed set of `Context/` subfolders that carry a category label.
/// Files elsewhere under `Context/` have no category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextCategory {
    Initiation,
    Ongoing,
    Predicates,
    #[serde(rename = "Regulatory Strategy")]
    RegulatoryStrategy,
    General,
}

impl ContextCategory {
    /// Map an immediate `Context/` subfolder name to its category.
    pub fn from_folder(name: &str) -> Option<Self> {
        match name {
            "Initiation" => Some(ContextCategory::Initiation),
            "Ongoing" => Some(ContextCategory::Ongoing),
            "Predicates" => Some(ContextCategory::Predicates),
            "Regulatory Strategy" => Some(ContextCategory::RegulatoryStrategy),
            "General" => Some(ContextCategory::General),
            _ => None,
        }
    }
}

// ── Chunks and search results ───────────────────────────────────────

/// A contiguous span of one source document, the unit of retrieval.
///
/// Invariants: concatenating a document's chunks in `chunk_index` order
/// covers every non-whitespace character of the source at least once; no
/// chunk is empty; indices are dense `0..n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id derived from `(source_path, chunk_index, content_hash)`.
    pub id: String,
    /// Path of the source file, relative to the project root.
    pub source_path: String,
    /// Bare file name of the source.
    pub file_name: String,
    /// Retrieval bucket this chunk belongs to.
    pub category: DocCategory,
    /// Context subfolder label, when the source lives in one.
    pub context_category: Option<ContextCategory>,
    /// 0-based position within the source document.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
    /// Content hash of the chunk text.
    pub content_hash: String,
}

/// A search hit pairing a chunk with its cosine similarity.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Cosine similarity against the query (1.0 identical direction).
    pub similarity: f32,
}

// ── Summaries ───────────────────────────────────────────────────────

/// Extractive first-N-words summary of one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    /// Bare file name of the summarized source.
    pub file_name: String,
    /// Content hash of the full source text, used for invalidation.
    pub content_hash: String,
    /// First N whitespace tokens, joined by single spaces.
    pub first_words: String,
    /// RFC 3339 timestamp of summary creation.
    pub generated_at: String,
}

// ── Retrieval options and results ───────────────────────────────────

/// Per-request retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Number of procedure chunks to return; 0 disables procedure search.
    pub top_k_procedures: usize,
    /// Number of context chunks to return; 0 disables context search.
    pub top_k_context: usize,
    /// Include procedure and context summaries in the assembled context.
    pub include_summaries: bool,
    /// Approximate upper bound for the assembled context, in tokens.
    pub max_context_tokens: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k_procedures: 3,
            top_k_context: 2,
            include_summaries: true,
            max_context_tokens: 150_000,
        }
    }
}

/// A `(category, file, chunk)` source pointer for citation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceKey {
    pub category: DocCategory,
    pub file_name: String,
    pub chunk_index: usize,
}

/// The outcome of a retrieval pass: the assembled three-tier context plus
/// the raw material it was built from.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    /// Full context string handed to the text generator.
    pub assembled_context: String,
    /// Retained procedure hits, in presentation order.
    pub procedure_results: Vec<SearchResult>,
    /// Retained context hits, in presentation order.
    pub context_results: Vec<SearchResult>,
    /// Procedure summaries, alphabetical by file name.
    pub procedure_summaries: Vec<FileSummary>,
    /// Context summaries, alphabetical by file name.
    pub context_summaries: Vec<FileSummary>,
    /// One pointer per retained chunk, procedures first.
    pub sources: Vec<SourceKey>,
    /// Project fingerprint the answering cache was built against.
    pub project_fingerprint: String,
    /// Fingerprint of the vector store that answered the query.
    pub store_fingerprint: String,
    /// Embedding model the store was built with.
    pub model_version: String,
}

// ── Generation request/response ─────────────────────────────────────

/// Per-request generation knobs. Retrieval fields mirror
/// [`RetrievalOptions`]; reference notation in the prompt may raise them.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub top_k_procedures: usize,
    pub top_k_context: usize,
    pub include_summaries: bool,
    pub max_context_tokens: usize,
    /// Upper bound passed to the text generator, when set.
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        let r = RetrievalOptions::default();
        Self {
            top_k_procedures: r.top_k_procedures,
            top_k_context: r.top_k_context,
            include_summaries: r.include_summaries,
            max_context_tokens: r.max_context_tokens,
            max_output_tokens: None,
        }
    }
}

/// A generation request: which project, which primary context, what prompt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Project directory containing `Procedures/` and `Context/`.
    pub project_root: std::path::PathBuf,
    /// The primary-context configuration document (Tier 1 framing).
    pub primary_context_path: std::path::PathBuf,
    /// The user's prompt text, possibly carrying reference notation.
    pub prompt_text: String,
    /// Generation knobs.
    pub options: GenerationOptions,
}

/// Outcome status of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Error,
}

/// A numbered citation emitted alongside generated content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// 1-based citation number.
    pub id: usize,
    /// "Procedure", "Context", or "Regulatory Standard".
    pub kind: String,
    /// Rendered citation label.
    pub label: String,
}

/// Confidence band for a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Heuristic confidence rating: a level plus the signals behind it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceRating {
    pub level: ConfidenceLevel,
    pub rationale: String,
    pub criteria: Vec<String>,
}

/// Token accounting for one generation request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// 4-chars-per-token estimate of the assembled context.
    pub estimated_context_tokens: usize,
}

/// Request metadata echoed back with the generated content.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub project_fingerprint: String,
    pub store_fingerprint: String,
    pub model_version: String,
    pub elapsed_ms: u64,
    /// Error kind when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Free-form extras (reference notation echoes, counts).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// The full result of a generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    pub status: GenerationStatus,
    /// Short error message when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Generated body with the rendered sources block appended.
    pub generated_content: String,
    /// Citations in assignment order.
    pub references: Vec<Reference>,
    pub confidence: ConfidenceRating,
    pub usage: UsageStats,
    pub metadata: GenerationMetadata,
}
