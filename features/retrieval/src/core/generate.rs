//! The generation orchestrator: reference parsing, retrieval, generator
//! invocation, citations, and the confidence rating.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::api::error::RetrievalResult;
use crate::api::types::{
    ConfidenceLevel, ConfidenceRating, GenerationMetadata, GenerationOutput, GenerationRequest,
    GenerationStatus, RetrievalOptions, UsageStats,
};
use crate::api::GenerationService;
use crate::spi::generator::{GenerationParams, TextGenerator};

use super::prompt::{detect_standards, parse_references, split_envelope};
use super::retrieval::footnotes::FootnoteTracker;
use super::retrieval::service::{estimate_tokens, RetrievalService};

/// Output-size ceiling the confidence rating measures against.
const OUTPUT_TOKEN_CEILING: u32 = 32_768;

/// Procedure top-K floor applied when the prompt names a procedure.
const PROCEDURE_REF_TOP_K: usize = 5;

/// Default production implementation of [`GenerationService`].
pub struct DefaultGenerationService {
    retrieval: Arc<RetrievalService>,
    generator: Arc<dyn TextGenerator>,
}

impl DefaultGenerationService {
    pub fn new(retrieval: Arc<RetrievalService>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { retrieval, generator }
    }

    async fn run(&self, request: &GenerationRequest, started: Instant) -> RetrievalResult<GenerationOutput> {
        let options = &request.options;
        let references = parse_references(&request.prompt_text);

        // Reference notation widens retrieval: naming a procedure pulls in
        // more procedure excerpts, naming context files guarantees room for
        // at least as many context hits.
        let mut retrieval_options = RetrievalOptions {
            top_k_procedures: options.top_k_procedures,
            top_k_context: options.top_k_context,
            include_summaries: options.include_summaries,
            max_context_tokens: options.max_context_tokens,
        };
        if !references.procedures.is_empty() {
            retrieval_options.top_k_procedures =
                retrieval_options.top_k_procedures.max(PROCEDURE_REF_TOP_K);
        }
        if !references.context_files.is_empty() {
            retrieval_options.top_k_context =
                retrieval_options.top_k_context.max(references.context_files.len());
        }

        let retrieved = self
            .retrieval
            .retrieve(
                &request.project_root,
                &request.primary_context_path,
                &request.prompt_text,
                &retrieval_options,
            )
            .await?;

        let mut tracker = FootnoteTracker::new();
        for result in retrieved.procedure_results.iter().chain(retrieved.context_results.iter()) {
            tracker.add_chunk(
                result.chunk.category,
                &result.chunk.file_name,
                result.chunk.chunk_index,
            );
        }
        for standard in detect_standards(&request.prompt_text) {
            tracker.add_standard(standard.name, standard.description);
        }

        let (system_text, task_text) = split_envelope(&retrieved.assembled_context);
        let params = GenerationParams { max_tokens: options.max_output_tokens, ..GenerationParams::default() };
        let generated = self.generator.generate(system_text, task_text, &params).await?;

        let mut content = generated.text;
        if !tracker.is_empty() {
            content.push_str("\n\n");
            content.push_str(&tracker.render());
        }

        let confidence = rate_confidence(
            retrieval_options.top_k_procedures,
            retrieved.procedure_results.len(),
            retrieval_options.top_k_context,
            retrieved.context_results.len(),
            generated.output_tokens,
        );

        let mut metadata = GenerationMetadata {
            project_fingerprint: retrieved.project_fingerprint.clone(),
            store_fingerprint: retrieved.store_fingerprint.clone(),
            model_version: retrieved.model_version.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            error_kind: None,
            extra: Default::default(),
        };
        metadata
            .extra
            .insert("procedureChunks".to_string(), retrieved.procedure_results.len().to_string());
        metadata
            .extra
            .insert("contextChunks".to_string(), retrieved.context_results.len().to_string());
        if !references.master_record_fields.is_empty() {
            metadata
                .extra
                .insert("masterRecordFields".to_string(), references.master_record_fields.join(", "));
        }

        Ok(GenerationOutput {
            status: GenerationStatus::Success,
            message: None,
            generated_content: content,
            references: tracker.references(),
            confidence,
            usage: UsageStats {
                input_tokens: generated.input_tokens,
                output_tokens: generated.output_tokens,
                estimated_context_tokens: estimate_tokens(&retrieved.assembled_context),
            },
            metadata,
        })
    }
}

#[async_trait]
impl GenerationService for DefaultGenerationService {
    async fn generate(&self, request: GenerationRequest) -> GenerationOutput {
        let started = Instant::now();
        match self.run(&request, started).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "generation request failed");
                GenerationOutput {
                    status: GenerationStatus::Error,
                    message: Some(e.to_string()),
                    generated_content: String::new(),
                    references: Vec::new(),
                    confidence: ConfidenceRating {
                        level: ConfidenceLevel::Low,
                        rationale: "generation failed before content was produced".to_string(),
                        criteria: Vec::new(),
                    },
                    usage: UsageStats::default(),
                    metadata: GenerationMetadata {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        error_kind: Some(e.kind().to_string()),
                        ..Default::default()
                    },
                }
            }
        }
    }
}

/// Heuristic confidence from source coverage, output size against the 32k
/// ceiling, and category presence. Signals, not a contract.
fn rate_confidence(
    requested_procedures: usize,
    returned_procedures: usize,
    requested_context: usize,
    returned_context: usize,
    output_tokens: u32,
) -> ConfidenceRating {
    let mut fractions = Vec::new();
    if requested_procedures > 0 {
        fractions.push(returned_procedures as f64 / requested_procedures as f64);
    }
    if requested_context > 0 {
        fractions.push(returned_context as f64 / requested_context as f64);
    }
    let coverage = if fractions.is_empty() {
        1.0
    } else {
        fractions.iter().sum::<f64>() / fractions.len() as f64
    };

    let categories_present = (requested_procedures == 0 || returned_procedures > 0)
        && (requested_context == 0 || returned_context > 0);
    let size_fraction = f64::from(output_tokens) / f64::from(OUTPUT_TOKEN_CEILING);

    let mut criteria = vec![format!("source coverage {coverage:.2}")];
    criteria.push(if categories_present {
        "all requested categories returned results".to_string()
    } else {
        "a requested category returned no results".to_string()
    });
    criteria.push(format!("output used {:.0}% of the 32k ceiling", size_fraction * 100.0));

    let level = if coverage >= 0.75 && categories_present && size_fraction < 1.0 {
        ConfidenceLevel::High
    } else if coverage >= 0.35 || categories_present {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let rationale = match level {
        ConfidenceLevel::High => "retrieval covered the requested sources well".to_string(),
        ConfidenceLevel::Medium => "retrieval returned a partial set of requested sources".to_string(),
        ConfidenceLevel::Low => "retrieval found little of the requested material".to_string(),
    };

    ConfidenceRating { level, rationale, criteria }
}
