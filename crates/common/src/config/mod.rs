//! Configuration management for konkyo services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Every field has a default so an empty configuration is valid.

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Index snapshot and dataset locations
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Evidence extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Low-confidence escalation configuration
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Maximum queries accepted by one batch request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Path of the JSON index snapshot
    #[serde(default = "default_index_path")]
    pub path: PathBuf,

    /// Dataset the index builder reads
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Record field holding the document text
    #[serde(default = "default_content_key")]
    pub content_key: String,

    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between neighbouring chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension for the hashing provider
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Completion provider: openai, disabled
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// Chat completions endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Output token budget for generated answers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Timeout for one similarity search in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Sentence scoring mode: rich, fast
    #[serde(default = "default_extraction_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EscalationConfig {
    /// Re-chunk and re-score low-confidence hits
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Retrieval confidence below which escalation runs
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Alternative chunk sizes in characters, tried in order
    #[serde(default = "default_escalation_chunk_sizes")]
    pub chunk_sizes: Vec<usize>,

    /// Hits pooled per document when voting for a better source; 0 disables the vote
    #[serde(default = "default_document_top_k")]
    pub document_top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_concurrent() -> usize { 100 }
fn default_max_batch_size() -> usize { 10 }
fn default_index_path() -> PathBuf { PathBuf::from("data/index.json") }
fn default_dataset_path() -> PathBuf { PathBuf::from("data/dataset.json") }
fn default_content_key() -> String { "output".to_string() }
fn default_chunk_size() -> usize { 300 }
fn default_chunk_overlap() -> usize { 100 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 256 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_generation_provider() -> String { "openai".to_string() }
fn default_generation_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_generation_timeout() -> u64 { 30 }
fn default_max_tokens() -> u32 { 150 }
fn default_temperature() -> f32 { 0.0 }
fn default_retrieval_timeout() -> u64 { 30 }
fn default_extraction_mode() -> String { "rich".to_string() }
fn default_confidence_threshold() -> f32 { 0.5 }
fn default_escalation_chunk_sizes() -> Vec<usize> { vec![1000, 500] }
fn default_document_top_k() -> usize { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "konkyo".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false));

        Self::finish(builder)
    }

    /// Load from a specific TOML file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::finish(Config::builder().add_source(File::with_name(path)))
    }

    /// Layer APP__ environment variables on top of the file sources
    /// e.g., APP__SERVER__PORT=8081, APP__ESCALATION__CHUNK_SIZES=800,400
    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config = builder
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("escalation.chunk_sizes")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = config.try_deserialize()?;
        config.apply_key_fallbacks();
        Ok(config)
    }

    /// Fill missing provider keys from OPENAI_API_KEY
    fn apply_key_fallbacks(&mut self) {
        let shared = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = shared.clone();
        }
        if self.generation.api_key.is_none() {
            self.generation.api_key = shared;
        }
    }

    /// Get retrieval timeout as Duration
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.timeout_secs)
    }

    /// Get generation timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_requests: default_max_concurrent(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            dataset_path: default_dataset_path(),
            content_key: default_content_key(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: default_extraction_mode(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            confidence_threshold: default_confidence_threshold(),
            chunk_sizes: default_escalation_chunk_sizes(),
            document_top_k: default_document_top_k(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
