//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible `/embeddings` endpoints (text-embedding-3-small)
//! - A deterministic hashing embedder for offline indexes and tests

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::text;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
    batch_size: usize,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder from configuration
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key (or OPENAI_API_KEY) is required for the openai provider".to_string(),
            })?;

        // ada-002 has a fixed width; text-embedding-3 models are truncated
        // to the configured dimension server-side
        let dimension = match config.model.as_str() {
            "text-embedding-ada-002" => 1536,
            _ => config.dimension,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
            timeout_secs: config.timeout_secs,
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build()
    }

    /// Make request with exponential backoff. Client errors other than
    /// 429 are not retried.
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let attempts = &AtomicU32::new(0);
        let start = Instant::now();

        let result = retry(self.backoff_policy(), move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match self.make_request(texts).await {
                Ok(embeddings) => Ok(embeddings),
                Err(backoff::Error::Transient { err, .. }) if attempt <= self.max_retries => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Embedding request failed, retrying"
                    );
                    Err(backoff::Error::transient(err))
                }
                Err(backoff::Error::Transient { err, .. }) => Err(backoff::Error::permanent(err)),
                Err(permanent) => Err(permanent),
            }
        })
        .await;

        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            &self.model,
            texts.len(),
            result.is_ok(),
        );
        result
    }

    async fn make_request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, backoff::Error<AppError>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
            dimensions: self.model.starts_with("text-embedding-3").then_some(self.dimension),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(if e.is_timeout() {
                    AppError::EmbeddingTimeout {
                        timeout_ms: self.timeout_secs * 1000,
                    }
                } else {
                    AppError::EmbeddingError {
                        message: format!("Request failed: {}", e),
                    }
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            };
            return Err(if status.is_client_error() && status.as_u16() != 429 {
                backoff::Error::permanent(err)
            } else {
                backoff::Error::transient(err)
            });
        }

        let mut result: OpenAIResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        if result.data.len() != texts.len() {
            return Err(backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("expected {} embeddings, got {}", texts.len(), result.data.len()),
            }));
        }

        result.data.sort_by_key(|e| e.index);
        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic bag-of-terms embedder.
///
/// Each lexical term is hashed into one of `dimension` buckets and the
/// vector is L2-normalised. Needs no network, so an index built with it
/// can be queried offline.
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model: format!("hashing-{}", dimension),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for term in text::terms(text) {
            let digest = Sha256::digest(term.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hashing" | "mock" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("コンバインは農業機械です。").await.unwrap();
        let b = embedder.embed("コンバインは農業機械です。").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_empty_text() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_hashing_batch() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["稲・麦".to_string(), "大豆".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[1], embedder.embed("大豆").await.unwrap());
        assert_eq!(embedder.model_name(), "hashing-32");
    }

    #[test]
    fn test_create_embedder() {
        let mut config = EmbeddingConfig::default();
        config.api_key = None;
        assert!(matches!(create_embedder(&config), Err(AppError::Configuration { .. })));

        config.provider = "hashing".to_string();
        config.dimension = 128;
        assert_eq!(create_embedder(&config).unwrap().dimension(), 128);

        config.provider = "openai".to_string();
        config.api_key = Some("sk-test".to_string());
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "text-embedding-3-small");

        config.provider = "word2vec".to_string();
        assert!(create_embedder(&config).is_err());
    }
}
