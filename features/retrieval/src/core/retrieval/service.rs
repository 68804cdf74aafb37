//! Query-time retrieval orchestration and context assembly.
//!
//! One retrieval pass embeds the prompt, runs a top-K search per category
//! against the project's VALID cache, and assembles a three-tier context:
//! role framing from the primary-context document, overviews and retrieved
//! excerpts, then the task delimiter and the user's prompt. The token cap
//! only ever drops Tier 2 chunks, context first.

use std::path::Path;
use std::sync::Arc;

use crate::api::error::{RetrievalError, RetrievalResult};
use crate::api::types::{
    DocCategory, FileSummary, RetrievalOptions, RetrievedContext, SearchResult, SourceKey,
};
use crate::spi::embedding::EmbeddingProvider;
use crate::spi::parser::DocumentParser;

use super::cache::CacheCoordinator;

/// Delimiter separating the system context from the user task.
pub const TASK_DELIMITER: &str = "=== TASK ===";

/// Characters per token for the context-size heuristic.
const CHARS_PER_TOKEN: usize = 4;

/// Retrieval-time orchestration over a project's cache.
pub struct RetrievalService {
    coordinator: Arc<CacheCoordinator>,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalService {
    pub fn new(
        coordinator: Arc<CacheCoordinator>,
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { coordinator, parser, embedder }
    }

    /// Retrieve context for `prompt_text` against `project_root`.
    pub async fn retrieve(
        &self,
        project_root: &Path,
        primary_context: &Path,
        prompt_text: &str,
        options: &RetrievalOptions,
    ) -> RetrievalResult<RetrievedContext> {
        let entry = self.coordinator.get_or_build(project_root, primary_context).await?;

        let primary_doc =
            self.parser.parse(primary_context).await.ok_or_else(|| RetrievalError::Parse {
                path: primary_context.display().to_string(),
                reason: "primary context unreadable or unsupported".to_string(),
            })?;

        let query = self
            .embedder
            .embed(&[prompt_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetrievalError::EmbedderUnavailable("empty embedding for query".to_string())
            })?;

        let mut procedure_results =
            entry.store.search(&query, options.top_k_procedures, Some(DocCategory::Procedure));
        let mut context_results =
            entry.store.search(&query, options.top_k_context, Some(DocCategory::Context));

        // Similarity decided membership; presentation reads in file order.
        sort_for_presentation(&mut procedure_results);
        sort_for_presentation(&mut context_results);

        let procedure_summaries: Vec<FileSummary> =
            entry.sop_summaries.values().cloned().collect();
        let context_summaries: Vec<FileSummary> =
            entry.context_summaries.values().cloned().collect();

        let mut assembled = assemble_context(
            &primary_doc.text,
            &procedure_summaries,
            &context_summaries,
            &procedure_results,
            &context_results,
            prompt_text,
            options.include_summaries,
        );

        // Over the cap: drop Tier 2 chunks from the bottom, context before
        // procedures. Tier 1 and Tier 3 are never truncated.
        while estimate_tokens(&assembled) > options.max_context_tokens {
            if context_results.pop().is_none() && procedure_results.pop().is_none() {
                break;
            }
            assembled = assemble_context(
                &primary_doc.text,
                &procedure_summaries,
                &context_summaries,
                &procedure_results,
                &context_results,
                prompt_text,
                options.include_summaries,
            );
        }

        let sources = procedure_results
            .iter()
            .chain(context_results.iter())
            .map(|r| SourceKey {
                category: r.chunk.category,
                file_name: r.chunk.file_name.clone(),
                chunk_index: r.chunk.chunk_index,
            })
            .collect();

        tracing::debug!(
            procedures = procedure_results.len(),
            context = context_results.len(),
            chars = assembled.len(),
            "context assembled"
        );

        Ok(RetrievedContext {
            assembled_context: assembled,
            procedure_results,
            context_results,
            procedure_summaries,
            context_summaries,
            sources,
            project_fingerprint: entry.fingerprint.clone(),
            store_fingerprint: entry.store_fingerprint.clone(),
            model_version: entry.model_version.clone(),
        })
    }
}

fn sort_for_presentation(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.chunk
            .file_name
            .cmp(&b.chunk.file_name)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

/// 4-chars-per-token estimate, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Render the three-tier context envelope. Empty sections are omitted
/// entirely; Tier 1 and the task tier are always present.
pub fn assemble_context(
    primary_text: &str,
    procedure_summaries: &[FileSummary],
    context_summaries: &[FileSummary],
    procedure_results: &[SearchResult],
    context_results: &[SearchResult],
    prompt_text: &str,
    include_summaries: bool,
) -> String {
    let mut out = String::new();

    out.push_str("ROLE & BEHAVIORAL INSTRUCTIONS\n");
    out.push_str(primary_text.trim_end());
    out.push('\n');

    if include_summaries && !procedure_summaries.is_empty() {
        out.push_str("\nCOMPANY PROCEDURES OVERVIEW\n");
        for summary in procedure_summaries {
            out.push_str(&format!("- {}: {}\n", summary.file_name, summary.first_words));
        }
    }
    if include_summaries && !context_summaries.is_empty() {
        out.push_str("\nPROJECT CONTEXT OVERVIEW\n");
        for summary in context_summaries {
            out.push_str(&format!("- {}: {}\n", summary.file_name, summary.first_words));
        }
    }

    if !procedure_results.is_empty() {
        out.push_str("\nRELEVANT PROCEDURE EXCERPTS\n");
        for result in procedure_results {
            push_excerpt(&mut out, result);
        }
    }
    if !context_results.is_empty() {
        out.push_str("\nRELEVANT CONTEXT EXCERPTS\n");
        for result in context_results {
            push_excerpt(&mut out, result);
        }
    }

    out.push('\n');
    out.push_str(TASK_DELIMITER);
    out.push('\n');
    out.push_str(prompt_text);
    out
}

fn push_excerpt(out: &mut String, result: &SearchResult) {
    out.push_str(&format!(
        "[{} (Section {})]\n{}\n",
        result.chunk.file_name, result.chunk.chunk_index, result.chunk.text
    ));
}
