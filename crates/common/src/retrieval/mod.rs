//! Retrieval adapter
//!
//! Wraps a similarity-search backend behind [`VectorStore`] and resolves the
//! single best chunk back to the full document it came from.

pub mod lexical;
mod store;

pub use store::{cosine_similarity, IndexSnapshot, MemoryVectorStore, SNAPSHOT_FORMAT_VERSION};

use crate::errors::Result;
use crate::metrics;
use crate::models::{Document, RetrievalHit};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Characters of a chunk used for prefix matching when containment fails
const PREFIX_MATCH_CHARS: usize = 50;

/// Provenance a backend may attach to a hit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub document_id: Option<String>,
}

/// One similarity-search result
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    /// Similarity in [0, 1], higher is better
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Similarity search over indexed chunks
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `k` chunks for `query`, best first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    fn chunk_count(&self) -> usize;
}

/// Every indexed document, addressable by id
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    documents: Vec<Arc<Document>>,
    by_id: HashMap<String, usize>,
}

impl DocumentCatalog {
    pub fn new(documents: Vec<Document>) -> Self {
        let documents: Vec<Arc<Document>> = documents.into_iter().map(Arc::new).collect();
        let by_id = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        Self { documents, by_id }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.by_id.get(id).map(|&i| Arc::clone(&self.documents[i]))
    }

    /// Find the document a chunk came from.
    ///
    /// The id hint wins when that document really contains the chunk.
    /// Otherwise the first document containing the chunk, then the first
    /// document containing the chunk's opening characters.
    pub fn resolve(&self, chunk: &str, id_hint: Option<&str>) -> Option<Arc<Document>> {
        if let Some(doc) = id_hint.and_then(|id| self.get(id)) {
            if doc.content.contains(chunk) {
                return Some(doc);
            }
        }

        if let Some(doc) = self.documents.iter().find(|d| d.content.contains(chunk)) {
            return Some(Arc::clone(doc));
        }

        let prefix: String = chunk.chars().take(PREFIX_MATCH_CHARS).collect();
        if prefix.trim().is_empty() {
            return None;
        }
        self.documents
            .iter()
            .find(|d| d.content.contains(prefix.as_str()))
            .map(Arc::clone)
    }
}

/// Runs a similarity search and maps the best hit to its document
pub struct RetrievalAdapter {
    store: Arc<dyn VectorStore>,
    catalog: Arc<DocumentCatalog>,
    timeout: Duration,
}

impl RetrievalAdapter {
    pub fn new(store: Arc<dyn VectorStore>, catalog: Arc<DocumentCatalog>, timeout: Duration) -> Self {
        Self {
            store,
            catalog,
            timeout,
        }
    }

    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    pub fn chunk_count(&self) -> usize {
        self.store.chunk_count()
    }

    /// Best hit for `query`, or `None` when nothing is indexed, the search
    /// fails or times out, or the chunk cannot be resolved.
    pub async fn retrieve(&self, query: &str) -> Option<RetrievalHit> {
        self.retrieve_ranked(query, 1).await.into_iter().next()
    }

    /// Up to `k` hits, best first. Chunks that resolve to no document are
    /// dropped; search failures and timeouts yield an empty list.
    pub async fn retrieve_ranked(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        let start = Instant::now();
        let searched = tokio::time::timeout(self.timeout, self.store.search(query, k.max(1))).await;
        let elapsed = start.elapsed().as_secs_f64();

        let scored = match searched {
            Ok(Ok(scored)) => scored,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Similarity search failed");
                metrics::record_retrieval(elapsed, "error");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Similarity search timed out");
                metrics::record_retrieval(elapsed, "timeout");
                return Vec::new();
            }
        };

        if scored.is_empty() {
            metrics::record_retrieval(elapsed, "empty");
            return Vec::new();
        }

        let hits: Vec<RetrievalHit> = scored
            .into_iter()
            .filter_map(|chunk| {
                let Some(document) = self.catalog.resolve(&chunk.content, chunk.metadata.document_id.as_deref())
                else {
                    tracing::warn!(
                        chunk_chars = chunk.content.chars().count(),
                        "Retrieved chunk does not match any indexed document"
                    );
                    return None;
                };
                Some(RetrievalHit {
                    chunk_content: chunk.content,
                    relevance_score: chunk.score.clamp(0.0, 1.0),
                    document,
                })
            })
            .collect();

        if hits.is_empty() {
            metrics::record_retrieval(elapsed, "unresolved");
            return hits;
        }

        metrics::record_retrieval(elapsed, "hit");
        tracing::debug!(
            hits = hits.len(),
            document_id = %hits[0].document.id,
            score = hits[0].relevance_score,
            latency_ms = (elapsed * 1000.0) as u64,
            "Retrieved chunks"
        );
        hits
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned vector stores for adapter and orchestrator tests

    use super::*;
    use crate::errors::AppError;

    pub struct FixedStore {
        pub hits: Vec<ScoredChunk>,
    }

    impl FixedStore {
        pub fn single(content: &str, score: f32, document_id: Option<&str>) -> Self {
            Self {
                hits: vec![ScoredChunk {
                    content: content.to_string(),
                    score,
                    metadata: ChunkMetadata {
                        document_id: document_id.map(str::to_string),
                    },
                }],
            }
        }

        pub fn empty() -> Self {
            Self { hits: Vec::new() }
        }
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }

        fn chunk_count(&self) -> usize {
            self.hits.len()
        }
    }

    pub struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredChunk>> {
            Err(AppError::EmbeddingError {
                message: "connection refused".to_string(),
            })
        }

        fn chunk_count(&self) -> usize {
            0
        }
    }

    pub struct SlowStore;

    #[async_trait]
    impl VectorStore for SlowStore {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredChunk>> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Vec::new())
        }

        fn chunk_count(&self) -> usize {
            0
        }
    }
}
