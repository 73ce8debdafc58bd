//! Index building pipeline
//!
//! documents -> chunks -> embeddings -> snapshot on disk

use crate::errors::{IngestionError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use konkyo_common::chunking::{chunk_text, ChunkingConfig};
use konkyo_common::embeddings::Embedder;
use konkyo_common::metrics;
use konkyo_common::models::{Chunk, Document};
use konkyo_common::retrieval::IndexSnapshot;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Number of embedding batches in flight at once
const DEFAULT_CONCURRENCY: usize = 4;

/// Summary of a finished build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: String,
    pub dimension: usize,
}

/// Builds an index snapshot from loaded documents
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            chunking,
            batch_size: batch_size.max(1),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Chunk and embed every document.
    ///
    /// Chunk order follows document order, and embeddings are matched to
    /// chunks by position.
    pub async fn build(&self, documents: Vec<Document>) -> Result<IndexSnapshot> {
        let start = Instant::now();

        let mut pending = Vec::new();
        for document in &documents {
            let pieces = chunk_text(&document.content, &self.chunking)
                .map_err(|e| IngestionError::Chunking(format!("document {}: {}", document.id, e)))?;
            debug!(document_id = %document.id, chunks = pieces.len(), "Chunked document");
            pending.extend(pieces.into_iter().map(|piece| (document.id.clone(), piece)));
        }

        let texts: Vec<String> = pending.iter().map(|(_, piece)| piece.content.clone()).collect();
        let embeddings = self.embed_all(&texts).await?;
        if embeddings.len() != pending.len() {
            return Err(IngestionError::Embedding(format!(
                "expected {} embeddings, received {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<Chunk> = pending
            .into_iter()
            .zip(embeddings)
            .map(|((document_id, piece), embedding)| Chunk {
                id: format!("{}-{}", document_id, piece.index),
                document_id,
                index: piece.index,
                content: piece.content,
                start_char: piece.start_char,
                end_char: piece.end_char,
                embedding,
            })
            .collect();

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunking.chunk_size,
            chunk_overlap = self.chunking.chunk_overlap,
            duration_ms = start.elapsed().as_millis() as u64,
            "Index built"
        );

        Ok(IndexSnapshot::new(
            self.embedder.model_name(),
            self.embedder.dimension(),
            documents,
            chunks,
        ))
    }

    /// Build and write the snapshot to `output`
    pub async fn build_to(&self, documents: Vec<Document>, output: &Path) -> Result<BuildReport> {
        let snapshot = self.build(documents).await?;
        snapshot.save(output).await?;

        metrics::record_ingestion(snapshot.documents.len(), snapshot.chunks.len());
        info!(path = %output.display(), "Index snapshot written");

        Ok(BuildReport {
            documents: snapshot.documents.len(),
            chunks: snapshot.chunks.len(),
            embedding_model: snapshot.embedding_model,
            dimension: snapshot.dimension,
        })
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let total_batches = texts.len().div_ceil(self.batch_size);

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.batch_size).enumerate())
            .map(|(i, batch)| async move {
                debug!(batch = i + 1, total_batches, size = batch.len(), "Embedding batch");
                self.embedder.embed_batch(batch).await.map_err(IngestionError::from)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }
}
