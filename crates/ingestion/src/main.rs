//! konkyo Index Builder
//!
//! One-shot job that turns a dataset into the index snapshot the gateway
//! and console load:
//! 1. Reads the JSON dataset
//! 2. Chunks each document
//! 3. Embeds the chunks in batches
//! 4. Writes the snapshot

mod errors;
mod loader;
mod pipeline;

use clap::Parser;
use konkyo_common::{chunking::ChunkingConfig, config::AppConfig, embeddings::create_embedder, VERSION};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build the konkyo retrieval index from a JSON dataset
#[derive(Debug, Parser)]
#[command(name = "konkyo-ingest", version, about)]
struct Args {
    /// Configuration file to use instead of config/{default,APP_ENV,local}
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset path (defaults to index.dataset_path)
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Snapshot output path (defaults to index.path)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Record field holding the document text
    #[arg(long)]
    content_key: Option<String>,

    /// Chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Chunk overlap in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Embedding batches sent concurrently
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy())?,
        None => AppConfig::load()?,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting konkyo index builder v{}", VERSION);

    let dataset = args.dataset.unwrap_or_else(|| config.index.dataset_path.clone());
    let output = args.output.unwrap_or_else(|| config.index.path.clone());
    let content_key = args.content_key.unwrap_or_else(|| config.index.content_key.clone());
    let chunking = ChunkingConfig::new(
        args.chunk_size.unwrap_or(config.index.chunk_size),
        args.chunk_overlap.unwrap_or(config.index.chunk_overlap),
    );

    let loaded = loader::load_dataset(&dataset, &content_key).await?;
    info!(
        path = %dataset.display(),
        documents = loaded.documents.len(),
        skipped_empty = loaded.skipped_empty,
        skipped_duplicate = loaded.skipped_duplicate,
        "Dataset loaded"
    );

    let embedder = create_embedder(&config.embedding)?;
    let report = pipeline::IndexBuilder::new(embedder, chunking, config.embedding.batch_size)
        .with_concurrency(args.concurrency)
        .build_to(loaded.documents, &output)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Index build failed");
            e
        })?;

    info!(
        documents = report.documents,
        chunks = report.chunks,
        embedding_model = %report.embedding_model,
        dimension = report.dimension,
        path = %output.display(),
        "Index builder finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "konkyo-ingest",
            "--dataset",
            "data/combine.json",
            "--content-key",
            "text",
            "--chunk-size",
            "500",
        ])
        .unwrap();

        assert_eq!(args.dataset, Some(PathBuf::from("data/combine.json")));
        assert_eq!(args.content_key.as_deref(), Some("text"));
        assert_eq!(args.chunk_size, Some(500));
        assert_eq!(args.output, None);
        assert_eq!(args.config, None);
        assert_eq!(args.concurrency, 4);
    }
}
