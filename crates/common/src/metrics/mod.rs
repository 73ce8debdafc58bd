//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions and recording helpers
//! with standardized naming conventions. Recording is a no-op until a
//! recorder is installed (the gateway installs the Prometheus exporter).

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all konkyo metrics
pub const METRICS_PREFIX: &str = "konkyo";

/// Histogram buckets for request latency (in seconds)
/// Definition answers skip generation and land in the low buckets.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of answered or unmatched queries"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Similarity searches by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Similarity search latency in seconds"
    );

    describe_counter!(
        format!("{}_escalations_total", METRICS_PREFIX),
        Unit::Count,
        "Low-confidence escalations and whether they improved confidence"
    );

    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Composed answers by path (definition, generated, fallback)"
    );

    // Generation metrics
    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion service latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Completion service failures"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    // Index metrics
    describe_gauge!(
        format!("{}_index_documents", METRICS_PREFIX),
        Unit::Count,
        "Documents in the loaded index"
    );

    describe_gauge!(
        format!("{}_index_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks in the loaded index"
    );

    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents written to an index snapshot"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks written to an index snapshot"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished query. `outcome` is `answered` or `no_match`.
pub fn record_query(duration_secs: f64, strategy: &str, outcome: &str) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

pub fn record_escalation(improved: bool) {
    counter!(
        format!("{}_escalations_total", METRICS_PREFIX),
        "improved" => improved.to_string()
    )
    .increment(1);
}

pub fn record_answer(path: &str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .increment(1);
}

/// Helper to record completion service metrics
pub fn record_generation(duration_secs: f64, model: &str, success: bool) {
    if success {
        histogram!(
            format!("{}_generation_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_generation_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => if batch_size > 1 { "batch" } else { "single" }
        )
        .record(duration_secs);
    }
}

/// Publish the size of the loaded index
pub fn record_index_size(documents: usize, chunks: usize) {
    gauge!(format!("{}_index_documents", METRICS_PREFIX)).set(documents as f64);
    gauge!(format!("{}_index_chunks", METRICS_PREFIX)).set(chunks as f64);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(documents: usize, chunks_created: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(documents as u64);
    counter!(format!("{}_chunks_created_total", METRICS_PREFIX)).increment(chunks_created as u64);
}
