//! Wiring: builds the query orchestrator from configuration

use crate::config::AppConfig;
use crate::context::{create_generator, AnswerComposer, EvidenceExtractor, ExtractorMode};
use crate::embeddings::create_embedder;
use crate::errors::Result;
use crate::metrics;
use crate::orchestrator::{EscalationPolicy, QueryOrchestrator};
use crate::retrieval::{IndexSnapshot, MemoryVectorStore, RetrievalAdapter, VectorStore};
use std::sync::Arc;
use tracing::info;

/// Load the index and construct every collaborator.
///
/// Fails when the index is missing or was built with a different
/// embedder, or when a configured provider lacks credentials.
pub async fn build_orchestrator(config: &AppConfig) -> Result<QueryOrchestrator> {
    let mode: ExtractorMode = config.extraction.mode.parse()?;

    let embedder = create_embedder(&config.embedding)?;
    let snapshot = IndexSnapshot::load(&config.index.path).await?;
    let (store, catalog) = MemoryVectorStore::from_snapshot(snapshot, embedder)?;
    metrics::record_index_size(catalog.len(), store.chunk_count());

    let generator = create_generator(&config.generation)?;
    let composer = AnswerComposer::new(generator, config.generation.max_tokens, config.generation_timeout());
    let retrieval = RetrievalAdapter::new(Arc::new(store), Arc::new(catalog), config.retrieval_timeout());
    let escalation = EscalationPolicy::from(&config.escalation);

    info!(
        documents = retrieval.catalog().len(),
        chunks = retrieval.chunk_count(),
        embedding_model = %config.embedding.model,
        generation_model = composer.model_name(),
        extraction_mode = mode.as_str(),
        escalation = escalation.enabled,
        "Query orchestrator ready"
    );

    Ok(QueryOrchestrator::new(
        retrieval,
        EvidenceExtractor::new(mode),
        composer,
        escalation,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, HashingEmbedder};
    use crate::errors::AppError;
    use crate::models::{Chunk, Document};

    async fn write_index(path: &std::path::Path, dimension: usize) {
        let embedder = HashingEmbedder::new(dimension);
        let doc = Document::new("doc#0", "自立型は日本独自の農業機械です。");
        let chunk = Chunk {
            id: format!("{}-0", doc.id),
            document_id: doc.id.clone(),
            index: 0,
            content: doc.content.clone(),
            start_char: 0,
            end_char: 16,
            embedding: embedder.embed(&doc.content).await.unwrap(),
        };
        IndexSnapshot::new(embedder.model_name(), dimension, vec![doc], vec![chunk])
            .save(path)
            .await
            .unwrap();
    }

    fn offline_config(index: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.index.path = index.to_path_buf();
        config.embedding.provider = "hashing".to_string();
        config.embedding.dimension = 64;
        config.generation.provider = "disabled".to_string();
        config
    }

    #[tokio::test]
    async fn test_build_and_query_offline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        write_index(&path, 64).await;

        let orchestrator = build_orchestrator(&offline_config(&path)).await.unwrap();
        assert_eq!(orchestrator.status().documents, 1);

        let result = orchestrator.query("自立型は日本独自のものですか").await.unwrap();
        assert_eq!(result.evidence_text, "自立型は日本独自の農業機械です。");
    }

    #[tokio::test]
    async fn test_missing_index_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_orchestrator(&offline_config(&dir.path().join("none.json")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        write_index(&path, 32).await;

        let err = build_orchestrator(&offline_config(&path)).await.err().unwrap();
        assert!(matches!(err, AppError::IndexMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unknown_extraction_mode() {
        let mut config = offline_config(std::path::Path::new("unused.json"));
        config.extraction.mode = "clever".to_string();
        let err = build_orchestrator(&config).await.err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
