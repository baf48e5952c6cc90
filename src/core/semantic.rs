use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::core::outcome::{elapsed_ms, ComponentOutcome, ComponentStatus, ScoringError};
use crate::core::similarity::{cosine_similarity, round4};
use crate::core::text::{contains_any, split_paragraphs, split_sentences};
use crate::models::{CompanyProfile, Opportunity};
use crate::services::{EmbeddingStore, EntityEmbeddings, EntityKey, EntityTexts};

/// Blend of the three similarity levels
const FULL_DOCUMENT_WEIGHT: f64 = 0.40;
const SECTION_WEIGHT: f64 = 0.35;
const BEST_CHUNK_WEIGHT: f64 = 0.25;

/// Chunk pairs at or below this similarity are not reported
const CHUNK_MATCH_FLOOR: f64 = 0.3;
const MAX_CHUNK_MATCHES: usize = 10;
/// Chunk pairs above this count towards match strength
const STRONG_CHUNK_SIMILARITY: f64 = 0.7;
const STRONG_CHUNKS_FOR_FULL_STRENGTH: f64 = 5.0;

const SENTENCES_PER_CHUNK: usize = 3;
const REQUIREMENT_MARKERS: &[&str] = &["shall", "must", "require", "required", "requires", "requirement", "requirements"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub opportunity_chunk: usize,
    pub company_capability: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestChunkSimilarity {
    pub max_similarity: f64,
    pub chunk_matches: Vec<ChunkMatch>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIndicators {
    pub embedding_coverage: f64,
    pub score_consistency: f64,
    pub match_strength: f64,
}

/// Output of [`SemanticScorer::score`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub status: ComponentStatus,
    pub full_document_similarity: f64,
    /// Opportunity section → company document type → similarity
    pub section_similarities: BTreeMap<String, BTreeMap<String, f64>>,
    pub best_chunk_similarity: BestChunkSimilarity,
    pub weighted_average_similarity: f64,
    pub confidence_indicators: ConfidenceIndicators,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: f64,
}

impl SimilarityResult {
    fn error(err: &ScoringError, processing_time_ms: f64) -> Self {
        Self {
            status: ComponentStatus::Error,
            full_document_similarity: 0.0,
            section_similarities: BTreeMap::new(),
            best_chunk_similarity: BestChunkSimilarity::default(),
            weighted_average_similarity: 0.0,
            confidence_indicators: ConfidenceIndicators::default(),
            error: Some(err.to_string()),
            processing_time_ms,
        }
    }

    /// Typed outcome fed to the aggregator
    pub fn outcome(&self) -> ComponentOutcome {
        match self.status {
            ComponentStatus::Ok => ComponentOutcome::ok(self.weighted_average_similarity),
            ComponentStatus::NoData => ComponentOutcome::no_data(self.weighted_average_similarity),
            ComponentStatus::FallbackUsed => ComponentOutcome::fallback(self.weighted_average_similarity),
            ComponentStatus::Error => ComponentOutcome::failed(&ScoringError::Internal(
                self.error.clone().unwrap_or_else(|| "semantic scoring failed".to_string()),
            )),
        }
    }
}

/// Texts embedded for an opportunity
///
/// `full` is title, description and key fields; sections are title,
/// description and requirements; chunks are paragraphs of the full text.
pub fn opportunity_texts(opportunity: &Opportunity, max_chunks: usize) -> EntityTexts {
    let mut full = format!("{}\n\n{}", opportunity.title.trim(), opportunity.description.trim());
    let buyer = opportunity.buyer();
    if !buyer.is_empty() {
        full.push_str(&format!("\n\nAgency: {}", buyer));
    }
    if let Some(naics) = &opportunity.naics_code {
        full.push_str(&format!("\nNAICS: {}", naics));
    }
    if let Some(set_aside) = &opportunity.set_aside {
        full.push_str(&format!("\nSet-aside: {}", set_aside));
    }

    let requirements = match opportunity.requirements.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(r) => r.to_string(),
        None => split_sentences(&opportunity.description)
            .into_iter()
            .filter(|s| contains_any(s, REQUIREMENT_MARKERS))
            .collect::<Vec<_>>()
            .join(". "),
    };

    let sections = BTreeMap::from([
        ("title".to_string(), opportunity.title.trim().to_string()),
        ("description".to_string(), opportunity.description.trim().to_string()),
        ("requirements".to_string(), requirements),
    ]);

    let mut chunks = split_paragraphs(&full, SENTENCES_PER_CHUNK);
    chunks.truncate(max_chunks);

    EntityTexts { full, sections, chunks }
}

/// Texts embedded for a company
///
/// `full` is the profile (name, capability statement, NAICS,
/// certifications); documents are the capability statement and company
/// overview; chunks are capability-statement sentences.
pub fn company_texts(company: &CompanyProfile, max_chunks: usize) -> EntityTexts {
    let mut full = format!("{}\n\n{}", company.name.trim(), company.capability_statement.trim());
    if !company.naics_codes.is_empty() {
        full.push_str(&format!("\nNAICS: {}", company.naics_codes.join(", ")));
    }
    if !company.certifications.is_empty() {
        full.push_str(&format!("\nCertifications: {}", company.certifications.join(", ")));
    }

    let overview = company
        .document("company_overview")
        .or_else(|| company.document("overview"))
        .unwrap_or_default();

    let sections = BTreeMap::from([
        ("capability_statement".to_string(), company.capability_statement.trim().to_string()),
        ("company_overview".to_string(), overview.trim().to_string()),
    ]);

    let mut chunks = split_sentences(&company.capability_statement);
    chunks.truncate(max_chunks);

    EntityTexts { full, sections, chunks }
}

/// Multi-level embedding similarity between an opportunity and a company
pub struct SemanticScorer {
    store: Arc<EmbeddingStore>,
    max_chunks: usize,
}

impl SemanticScorer {
    pub fn new(store: Arc<EmbeddingStore>, max_chunks: usize) -> Self {
        Self {
            store,
            max_chunks: max_chunks.max(1),
        }
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// Score a pair. Never fails: missing embeddings score 0 with
    /// `no_data`, and a panic inside scoring becomes an `error` result.
    pub async fn score(&self, opportunity: &Opportunity, company: &CompanyProfile) -> SimilarityResult {
        let start = Instant::now();
        let scored = AssertUnwindSafe(self.compute(opportunity, company, start))
            .catch_unwind()
            .await;

        match scored {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("semantic_similarity scorer panicked: {}", message);
                SimilarityResult::error(
                    &ScoringError::Internal(format!("semantic_similarity: {message}")),
                    elapsed_ms(start),
                )
            }
        }
    }

    async fn compute(&self, opportunity: &Opportunity, company: &CompanyProfile, start: Instant) -> SimilarityResult {
        let opp_key = EntityKey::opportunity(&opportunity.notice_id);
        let company_key = EntityKey::company(&company.tenant_id, &company.company_id);
        let opp_texts = opportunity_texts(opportunity, self.max_chunks);
        let company_texts = company_texts(company, self.max_chunks);

        let (opp, comp) = tokio::join!(
            self.store.get_or_create(&opp_key, &opp_texts),
            self.store.get_or_create(&company_key, &company_texts),
        );

        let result = similarity(&opp, &comp, elapsed_ms(start));
        tracing::debug!(
            "Semantic similarity {} / {}: {} (coverage {})",
            opportunity.notice_id,
            company.company_id,
            result.weighted_average_similarity,
            result.confidence_indicators.embedding_coverage
        );
        SimilarityResult {
            processing_time_ms: elapsed_ms(start),
            ..result
        }
    }
}

/// Combine two entities' embeddings into a [`SimilarityResult`]
pub fn similarity(opp: &EntityEmbeddings, company: &EntityEmbeddings, processing_time_ms: f64) -> SimilarityResult {
    let full_document_similarity = cosine_similarity(&opp.full, &company.full);

    let mut section_similarities = BTreeMap::new();
    let mut row_maxima = Vec::new();
    for (section, section_vec) in opp.sections.iter().filter(|(_, v)| !v.is_empty()) {
        let row: BTreeMap<String, f64> = company
            .sections
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(doc, doc_vec)| (doc.clone(), cosine_similarity(section_vec, doc_vec)))
            .collect();
        if let Some(max) = row.values().copied().reduce(f64::max) {
            row_maxima.push(max);
            section_similarities.insert(section.clone(), row);
        }
    }
    let section_average = if row_maxima.is_empty() {
        0.0
    } else {
        row_maxima.iter().sum::<f64>() / row_maxima.len() as f64
    };

    let best_chunk_similarity = best_chunks(&opp.chunks, &company.chunks);

    let weighted_average_similarity = round4(
        FULL_DOCUMENT_WEIGHT * full_document_similarity
            + SECTION_WEIGHT * section_average
            + BEST_CHUNK_WEIGHT * best_chunk_similarity.max_similarity,
    );

    let strong = best_chunk_similarity
        .chunk_matches
        .iter()
        .filter(|m| m.similarity > STRONG_CHUNK_SIMILARITY)
        .count();
    let confidence_indicators = ConfidenceIndicators {
        embedding_coverage: opp.coverage().min(company.coverage()),
        score_consistency: 1.0 - (full_document_similarity - best_chunk_similarity.max_similarity).abs(),
        match_strength: (strong as f64 / STRONG_CHUNKS_FOR_FULL_STRENGTH).min(1.0),
    };

    let status = if confidence_indicators.embedding_coverage == 0.0 {
        ComponentStatus::NoData
    } else {
        ComponentStatus::Ok
    };

    SimilarityResult {
        status,
        full_document_similarity,
        section_similarities,
        best_chunk_similarity,
        weighted_average_similarity,
        confidence_indicators,
        error: None,
        processing_time_ms,
    }
}

fn best_chunks(opp_chunks: &[Vec<f32>], capabilities: &[Vec<f32>]) -> BestChunkSimilarity {
    let mut max_similarity = 0.0f64;
    let mut matches = Vec::new();

    for (i, chunk) in opp_chunks.iter().enumerate().filter(|(_, v)| !v.is_empty()) {
        for (j, capability) in capabilities.iter().enumerate().filter(|(_, v)| !v.is_empty()) {
            let similarity = cosine_similarity(chunk, capability);
            max_similarity = max_similarity.max(similarity);
            if similarity > CHUNK_MATCH_FLOOR {
                matches.push(ChunkMatch {
                    opportunity_chunk: i,
                    company_capability: j,
                    similarity,
                });
            }
        }
    }

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.opportunity_chunk.cmp(&b.opportunity_chunk))
            .then_with(|| a.company_capability.cmp(&b.company_capability))
    });
    matches.truncate(MAX_CHUNK_MATCHES);

    BestChunkSimilarity {
        max_similarity,
        chunk_matches: matches,
    }
}
