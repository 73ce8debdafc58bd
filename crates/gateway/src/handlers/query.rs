//! Query handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use konkyo_common::{
    errors::{AppError, ErrorDetails, Result},
    QueryResponse,
};

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,
}

/// Batch query request
#[derive(Debug, Deserialize)]
pub struct BatchQueryRequest {
    pub queries: Vec<String>,
}

/// Batch query response
#[derive(Serialize)]
pub struct BatchQueryResponse {
    pub results: Vec<BatchQueryItem>,
    pub processing_time_ms: u64,
}

/// One entry of a batch; exactly one of `result` and `error` is set
#[derive(Serialize)]
pub struct BatchQueryItem {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Answer a single query
pub async fn query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();
    let Json(request) = payload?;

    request
        .validate()
        .map_err(|e| AppError::validation(e.to_string(), Some("query")))?;

    let result = state.orchestrator.query(&request.query).await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        strategy = result.strategy.as_str(),
        confidence = result.confidence,
        processing_time_ms,
        "Query completed"
    );

    Ok(Json(QueryResponse::from_result(
        result,
        processing_time_ms,
        state.orchestrator.model_name(),
    )))
}

/// Answer up to `server.max_batch_size` queries in order
pub async fn batch_query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BatchQueryRequest>, JsonRejection>,
) -> Result<Json<BatchQueryResponse>> {
    let start = Instant::now();
    let Json(request) = payload?;

    let limit = state.config.server.max_batch_size;
    if request.queries.is_empty() {
        return Err(AppError::validation("queries must not be empty", Some("queries")));
    }
    if request.queries.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: request.queries.len(),
            limit,
        });
    }

    let outcomes = state.orchestrator.batch_query(&request.queries).await;
    let model = state.orchestrator.model_name();
    let processing_time_ms = start.elapsed().as_millis() as u64;

    let results: Vec<BatchQueryItem> = request
        .queries
        .into_iter()
        .zip(outcomes)
        .map(|(query, outcome)| match outcome {
            Ok(result) => BatchQueryItem {
                query,
                result: Some(QueryResponse::from_result(result, processing_time_ms, model)),
                error: None,
            },
            Err(e) => BatchQueryItem {
                query,
                result: None,
                error: Some(ErrorDetails::from_error(&e)),
            },
        })
        .collect();

    tracing::info!(
        batch_size = results.len(),
        failed = results.iter().filter(|r| r.error.is_some()).count(),
        processing_time_ms,
        "Batch query completed"
    );

    Ok(Json(BatchQueryResponse {
        results,
        processing_time_ms,
    }))
}
