//! konkyo Common Library
//!
//! Shared code for the konkyo binaries (gateway, console, index builder):
//! - Evidence extraction and answer composition
//! - Retrieval over a persisted embedding index
//! - Query orchestration with low-confidence escalation
//! - Error types, configuration and metrics

pub mod chunking;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod service;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use models::{QueryResponse, QueryResult, ReportedRange, Strategy};
pub use orchestrator::QueryOrchestrator;
pub use service::build_orchestrator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
