//! Service info, health, readiness and metrics handlers

use crate::AppState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use konkyo_common::errors::{AppError, Result};
use serde::Serialize;

const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "GET /ready",
    "GET /metrics",
    "POST /query",
    "POST /batch_query",
];

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: &'static str,
    pub endpoints: &'static [&'static str],
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub index: CheckResult,
    pub generator: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub async fn index(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: state.config.observability.service_name.clone(),
        version: konkyo_common::VERSION,
        endpoints: ENDPOINTS,
    })
}

/// Liveness probe - always returns healthy if server is running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Readiness probe - reports what the query pipeline is serving.
///
/// An empty index still serves (every query is a no-match) but is
/// reported as `degraded`.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let status = state.orchestrator.status();

    let index = CheckResult {
        status: if status.documents > 0 { "up" } else { "empty" }.to_string(),
        detail: Some(format!("{} documents, {} chunks", status.documents, status.chunks)),
    };
    let generator = CheckResult {
        status: if status.generator_model == "disabled" { "disabled" } else { "up" }.to_string(),
        detail: Some(status.generator_model.clone()),
    };

    let overall = if status.documents > 0 { "ready" } else { "degraded" };
    Json(ReadyResponse {
        status: overall.to_string(),
        checks: ReadyChecks { index, generator },
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let handle = state.metrics.as_ref().ok_or_else(|| AppError::NotFound {
        resource_type: "endpoint".to_string(),
        id: "/metrics".to_string(),
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_router;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use konkyo_common::AppConfig;
    use tower::ServiceExt;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = test_router(AppConfig::default()).await;
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ready_reports_index() {
        let (status, json) = get_json("/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["checks"]["index"]["status"], "up");
        assert_eq!(json["checks"]["generator"]["status"], "disabled");
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_not_found() {
        let (status, json) = get_json("/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }
}
