//! Index builder error types

use konkyo_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Dataset {path} is not a JSON array of records: {message}")]
    InvalidDataset { path: String, message: String },

    #[error("Dataset {path} has no records with text under '{content_key}'")]
    EmptyDataset { path: String, content_key: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index write failed: {0}")]
    IndexWrite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Configuration { message } => IngestionError::Chunking(message),
            AppError::EmbeddingError { .. } | AppError::EmbeddingTimeout { .. } | AppError::HttpClient(_) => {
                IngestionError::Embedding(e.to_string())
            }
            other => IngestionError::IndexWrite(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
