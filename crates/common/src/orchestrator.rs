//! Query orchestration
//!
//! Drives one query through retrieval, evidence extraction, optional
//! low-confidence escalation and answer composition. Escalation first lets
//! the top hits vote for a source document, then re-chunks that document:
//!
//! ```text
//! Received -> Retrieved -> EvidenceExtracted -> Answered
//!     \-> NoMatch
//! ```

use crate::chunking::{chunk_text, ChunkingConfig};
use crate::config::EscalationConfig;
use crate::context::{AnswerComposer, EvidenceExtractor, ExtractorMode, QueryAnalysis};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Document, EvidenceSpan, QueryResult, RetrievalHit, Strategy};
use crate::retrieval::{lexical, RetrievalAdapter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Retrieved,
    EvidenceExtracted,
    Answered,
    NoMatch,
}

impl QueryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Received => "received",
            QueryState::Retrieved => "retrieved",
            QueryState::EvidenceExtracted => "evidence_extracted",
            QueryState::Answered => "answered",
            QueryState::NoMatch => "no_match",
        }
    }

    fn advance(&mut self, next: QueryState) {
        tracing::debug!(from = self.as_str(), to = next.as_str(), "Query state transition");
        *self = next;
    }
}

/// When and how to re-chunk a low-confidence hit
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationPolicy {
    pub enabled: bool,
    pub confidence_threshold: f32,
    pub chunk_sizes: Vec<usize>,
    /// Hits pooled for the document vote; below 2 there is nothing to vote on
    pub document_top_k: usize,
}

impl From<&EscalationConfig> for EscalationPolicy {
    fn from(config: &EscalationConfig) -> Self {
        Self {
            enabled: config.enabled,
            confidence_threshold: config.confidence_threshold,
            chunk_sizes: config.chunk_sizes.iter().copied().filter(|&s| s > 0).collect(),
            document_top_k: config.document_top_k,
        }
    }
}

impl EscalationPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 0.0,
            chunk_sizes: Vec::new(),
            document_top_k: 0,
        }
    }

    fn votes(&self) -> bool {
        self.document_top_k > 1
    }
}

/// Snapshot of what the orchestrator is serving
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub documents: usize,
    pub chunks: usize,
    pub generator_model: String,
    pub extraction_mode: ExtractorMode,
    pub escalation_enabled: bool,
}

/// Evidence found by escalation, in full-document offsets
struct Escalated {
    evidence: EvidenceSpan,
    confidence: f32,
}

/// Document backed by more of the top hits than the primary one
struct VotedDocument {
    document: Arc<Document>,
    /// Mean score of the hits from this document
    confidence: f32,
    hits: usize,
}

pub struct QueryOrchestrator {
    retrieval: RetrievalAdapter,
    extractor: EvidenceExtractor,
    composer: AnswerComposer,
    escalation: EscalationPolicy,
}

impl QueryOrchestrator {
    pub fn new(
        retrieval: RetrievalAdapter,
        extractor: EvidenceExtractor,
        composer: AnswerComposer,
        escalation: EscalationPolicy,
    ) -> Self {
        Self {
            retrieval,
            extractor,
            composer,
            escalation,
        }
    }

    pub fn model_name(&self) -> &str {
        self.composer.model_name()
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            documents: self.retrieval.catalog().len(),
            chunks: self.retrieval.chunk_count(),
            generator_model: self.composer.model_name().to_string(),
            extraction_mode: self.extractor.mode(),
            escalation_enabled: self.escalation_active(),
        }
    }

    fn escalation_active(&self) -> bool {
        self.escalation.enabled
            && self.extractor.mode() != ExtractorMode::Fast
            && (!self.escalation.chunk_sizes.is_empty() || self.escalation.votes())
    }

    /// Answer one query. Only an empty query is an error; everything
    /// downstream degrades to a no-match or fallback result.
    pub async fn query(&self, query: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut state = QueryState::Received;

        let analysis = QueryAnalysis::from_query(query);
        if analysis.text.is_empty() {
            return Err(AppError::validation("query must not be empty", Some("query")));
        }

        let Some(hit) = self.retrieval.retrieve(&analysis.text).await else {
            state.advance(QueryState::NoMatch);
            metrics::record_query(start.elapsed().as_secs_f64(), Strategy::NoMatch.as_str(), "no_match");
            tracing::info!(question_type = analysis.question_type.as_str(), "No document matched query");
            return Ok(QueryResult::no_match());
        };
        state.advance(QueryState::Retrieved);

        let mut source = Arc::clone(&hit.document);
        let mut evidence = self.extractor.extract_with(&source.content, &analysis);
        let mut confidence = hit.relevance_score;
        let mut strategy = Strategy::Primary;

        if self.escalation_active() && confidence < self.escalation.confidence_threshold {
            if let Some(voted) = self.document_vote(&hit, &analysis).await {
                tracing::debug!(
                    primary_document = %hit.document.id,
                    voted_document = %voted.document.id,
                    hits = voted.hits,
                    confidence = voted.confidence,
                    "Top hits favour another document"
                );
                evidence = self.extractor.extract_with(&voted.document.content, &analysis);
                source = voted.document;
                confidence = voted.confidence;
                strategy = Strategy::DocumentVote;
            }

            let escalated = self.escalate(&source.content, confidence, &analysis)?;
            metrics::record_escalation(strategy != Strategy::Primary || escalated.is_some());
            if let Some(escalated) = escalated {
                tracing::debug!(
                    primary = confidence,
                    rechunked = escalated.confidence,
                    "Escalation improved confidence"
                );
                evidence = escalated.evidence;
                confidence = escalated.confidence;
                strategy = Strategy::Rechunked;
            }
        }
        state.advance(QueryState::EvidenceExtracted);

        let answer = self.composer.compose_analyzed(&evidence, &analysis).await;
        state.advance(QueryState::Answered);

        let elapsed = start.elapsed();
        metrics::record_query(elapsed.as_secs_f64(), strategy.as_str(), "answered");
        tracing::info!(
            question_type = analysis.question_type.as_str(),
            strategy = strategy.as_str(),
            answer_path = answer.path.as_str(),
            confidence,
            start_char = evidence.start_char,
            end_char = evidence.end_char,
            latency_ms = elapsed.as_millis() as u64,
            "Query answered"
        );

        Ok(QueryResult {
            answer: answer.text,
            source_document: source.content.clone(),
            evidence_text: evidence.text,
            start_char: evidence.start_char,
            end_char: evidence.end_char,
            confidence,
            strategy,
        })
    }

    /// Answer each query in order; one invalid entry does not affect the rest
    pub async fn batch_query(&self, queries: &[String]) -> Vec<Result<QueryResult>> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push(self.query(query).await);
        }
        results
    }

    /// Group the top hits by document and pick the one with the highest
    /// summed score. `None` when that is the primary hit's document.
    async fn document_vote(&self, primary: &RetrievalHit, analysis: &QueryAnalysis) -> Option<VotedDocument> {
        if !self.escalation.votes() {
            return None;
        }

        let hits = self
            .retrieval
            .retrieve_ranked(&analysis.text, self.escalation.document_top_k)
            .await;

        // (document, summed score, hit count) in order of first appearance
        let mut tally: Vec<(Arc<Document>, f32, usize)> = Vec::new();
        for hit in hits {
            match tally.iter_mut().find(|entry| entry.0.id == hit.document.id) {
                Some(entry) => {
                    entry.1 += hit.relevance_score;
                    entry.2 += 1;
                }
                None => tally.push((hit.document, hit.relevance_score, 1)),
            }
        }

        let mut winner: Option<(Arc<Document>, f32, usize)> = None;
        for entry in tally {
            if winner.as_ref().map_or(true, |(_, sum, _)| entry.1 > *sum) {
                winner = Some(entry);
            }
        }

        let (document, sum, hits) = winner?;
        if document.id == primary.document.id {
            return None;
        }
        Some(VotedDocument {
            document,
            confidence: sum / hits as f32,
            hits,
        })
    }

    /// Re-chunk the document at each configured size and keep the window
    /// most similar to the query. Returns evidence only if that window
    /// beats `baseline`.
    fn escalate(&self, document: &str, baseline: f32, analysis: &QueryAnalysis) -> Result<Option<Escalated>> {
        let mut best: Option<(f32, crate::chunking::TextChunk)> = None;

        for &size in &self.escalation.chunk_sizes {
            for chunk in chunk_text(document, &ChunkingConfig::with_overlap_ratio(size))? {
                let score = lexical::tf_cosine(&analysis.text, &chunk.content);
                if best.as_ref().map_or(true, |(top, _)| score > *top) {
                    best = Some((score, chunk));
                }
            }
        }

        let Some((score, chunk)) = best else {
            return Ok(None);
        };
        if score <= baseline {
            return Ok(None);
        }

        let local = self.extractor.extract_with(&chunk.content, analysis);
        let evidence = EvidenceSpan::from_source(
            document,
            chunk.start_char + local.start_char,
            chunk.start_char + local.end_char,
        );
        Ok(Some(Escalated {
            evidence,
            confidence: score,
        }))
    }
}
