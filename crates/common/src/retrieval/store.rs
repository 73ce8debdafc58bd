//! Persisted index snapshot and the in-memory vector store built from it
//!
//! The snapshot is a single JSON file written by `konkyo-ingest`. It records
//! the embedding model and dimension it was built with; a query-time
//! embedder that disagrees is rejected at startup.

use super::{ChunkMetadata, DocumentCatalog, ScoredChunk, VectorStore};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::models::{Chunk, Document};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Bumped whenever the snapshot layout changes
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<Document>,
    pub chunks: Vec<Chunk>,
}

impl IndexSnapshot {
    pub fn new(embedding_model: impl Into<String>, dimension: usize, documents: Vec<Document>, chunks: Vec<Chunk>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            embedding_model: embedding_model.into(),
            dimension,
            created_at: Utc::now(),
            documents,
            chunks,
        }
    }

    /// Read and validate a snapshot
    pub async fn load(path: &Path) -> Result<Self> {
        let unavailable = |message: String| AppError::IndexUnavailable {
            path: path.display().to_string(),
            message,
        };

        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let snapshot: IndexSnapshot =
            serde_json::from_str(&data).map_err(|e| unavailable(format!("corrupt snapshot: {}", e)))?;
        snapshot.validate()?;

        tracing::info!(
            path = %path.display(),
            documents = snapshot.documents.len(),
            chunks = snapshot.chunks.len(),
            model = %snapshot.embedding_model,
            "Index snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Write the snapshot atomically (temp file, then rename)
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(AppError::IndexMismatch {
                message: format!(
                    "snapshot format {} is not supported (expected {})",
                    self.format_version, SNAPSHOT_FORMAT_VERSION
                ),
            });
        }

        let ids: HashSet<&str> = self.documents.iter().map(|d| d.id.as_str()).collect();
        for chunk in &self.chunks {
            if !ids.contains(chunk.document_id.as_str()) {
                return Err(AppError::IndexMismatch {
                    message: format!("chunk {} references unknown document {}", chunk.id, chunk.document_id),
                });
            }
            if chunk.embedding.len() != self.dimension {
                return Err(AppError::IndexMismatch {
                    message: format!(
                        "chunk {} has dimension {}, snapshot declares {}",
                        chunk.id,
                        chunk.embedding.len(),
                        self.dimension
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Brute-force cosine search over every chunk in memory
pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    chunks: Vec<Chunk>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, chunks: Vec<Chunk>) -> Self {
        Self { embedder, chunks }
    }

    /// Split a snapshot into a store and its document catalog, checking
    /// the embedder matches the one the snapshot was built with
    pub fn from_snapshot(snapshot: IndexSnapshot, embedder: Arc<dyn Embedder>) -> Result<(Self, DocumentCatalog)> {
        if snapshot.embedding_model != embedder.model_name() || snapshot.dimension != embedder.dimension() {
            return Err(AppError::IndexMismatch {
                message: format!(
                    "index built with {} ({} dims), configured embedder is {} ({} dims)",
                    snapshot.embedding_model,
                    snapshot.dimension,
                    embedder.model_name(),
                    embedder.dimension()
                ),
            });
        }

        let catalog = DocumentCatalog::new(snapshot.documents);
        Ok((Self::new(embedder, snapshot.chunks), catalog))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_embedding, &chunk.embedding).clamp(0.0, 1.0), chunk))
            .collect();
        // stable sort keeps index order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| ScoredChunk {
                content: chunk.content.clone(),
                score,
                metadata: ChunkMetadata {
                    document_id: Some(chunk.document_id.clone()),
                },
            })
            .collect())
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
