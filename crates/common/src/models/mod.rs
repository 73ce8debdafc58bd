//! Data model shared by the query path, the index builder and the
//! transport layers.
//!
//! Offsets are 0-indexed half-open character offsets everywhere except in
//! [`ReportedRange`], the one place the external convention is applied.

use crate::text::{char_len, char_slice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Answer returned when nothing relevant is indexed
pub const NOT_FOUND_ANSWER: &str = "情報が見つかりませんでした。";

/// An indexed source document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content-derived key
    pub id: String,

    /// Where the text came from (record URL or dataset position)
    pub source: String,

    /// Full original text
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: document_id(&content),
            source: source.into(),
            content,
        }
    }
}

/// First 16 hex characters of the SHA-256 of the content
pub fn document_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..8])
}

/// A stored chunk of a document with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,

    /// Weak reference to the parent document
    pub document_id: String,

    /// Position of this chunk within the document
    pub index: usize,

    pub content: String,

    /// Character range of `content` in the parent document
    pub start_char: usize,
    pub end_char: usize,

    pub embedding: Vec<f32>,
}

/// The single best similarity-search hit, resolved to its document
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub chunk_content: String,

    /// Similarity in [0, 1]; only comparable within one query
    pub relevance_score: f32,

    pub document: Arc<Document>,
}

/// Evidence location inside a source text.
///
/// Always built through [`EvidenceSpan::from_source`], so `text` is exactly
/// the characters `[start_char, end_char)` of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

impl EvidenceSpan {
    pub fn from_source(source: &str, start_char: usize, end_char: usize) -> Self {
        let text = char_slice(source, start_char, end_char).to_string();
        let start_char = start_char.min(char_len(source));
        Self {
            start_char,
            end_char: start_char + char_len(&text),
            text,
        }
    }

    pub fn empty() -> Self {
        Self {
            start_char: 0,
            end_char: 0,
            text: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_char == self.end_char
    }
}

/// How the evidence of a result was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Evidence from the retrieved document as a whole
    Primary,
    /// Evidence from a re-chunked window after a low-confidence hit
    Rechunked,
    /// Evidence from the document most top hits agree on
    DocumentVote,
    /// Nothing retrieved
    NoMatch,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::Rechunked => "rechunked",
            Strategy::DocumentVote => "document_vote",
            Strategy::NoMatch => "no_match",
        }
    }
}

/// Outcome of one query, with internal 0-indexed half-open offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub source_document: String,
    pub evidence_text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub confidence: f32,
    pub strategy: Strategy,
}

impl QueryResult {
    /// Sentinel result for an empty index or an unresolvable hit
    pub fn no_match() -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            source_document: String::new(),
            evidence_text: String::new(),
            start_char: 0,
            end_char: 0,
            confidence: 0.0,
            strategy: Strategy::NoMatch,
        }
    }

    pub fn is_match(&self) -> bool {
        self.strategy != Strategy::NoMatch
    }

    /// Offsets as reported to clients
    pub fn reported_range(&self) -> ReportedRange {
        ReportedRange::from_internal(self.start_char, self.end_char)
    }
}

/// Character range as clients see it: 1-indexed inclusive start,
/// inclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedRange {
    pub start_char: usize,
    pub end_char: usize,
}

impl ReportedRange {
    pub fn from_internal(start_char: usize, end_char: usize) -> Self {
        Self {
            start_char: start_char + 1,
            end_char,
        }
    }
}

/// JSON shape of a query result at the transport boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub source_document: String,
    pub evidence_text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub confidence: f32,
    pub strategy: Strategy,
    pub processing_time_ms: u64,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl QueryResponse {
    pub fn from_result(result: QueryResult, processing_time_ms: u64, model: &str) -> Self {
        let range = result.reported_range();
        Self {
            answer: result.answer,
            source_document: result.source_document,
            evidence_text: result.evidence_text,
            start_char: range.start_char,
            end_char: range.end_char,
            confidence: result.confidence,
            strategy: result.strategy,
            processing_time_ms,
            model: model.to_string(),
            timestamp: Utc::now(),
        }
    }
}
