//! konkyo HTTP Gateway
//!
//! Serves the question answering API over a prebuilt index.
//! Handles:
//! - Query and batch query routing
//! - Rate limiting and concurrency limits
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use konkyo_common::{config::AppConfig, metrics, QueryOrchestrator};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config);

    info!("Starting konkyo gateway v{}", konkyo_common::VERSION);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    // Load the index and build the query pipeline; refuse to start without it
    let orchestrator = konkyo_common::build_orchestrator(&config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to initialise query pipeline");
        e
    })?;

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        orchestrator: Arc::new(orchestrator),
        metrics: metrics_handle,
        started_at: Instant::now(),
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api_routes = Router::new()
        .route("/", get(handlers::health::index))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .route("/query", post(handlers::query::query))
        .route("/batch_query", post(handlers::query::batch_query))
        .route_layer(axum::middleware::from_fn(middleware::request_metrics::track_requests));

    let rate_limit = &state.config.rate_limit;
    if rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst);
        let limit = rate_limit.requests_per_second;
        api_routes = api_routes.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone(), limit)
            },
        ));
    }

    api_routes
        .layer(ConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests.max(1)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_and_request_id() {
        let app = test_router(AppConfig::default()).await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_burst() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = test_router(config).await;

        let first = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let app = test_router(AppConfig::default()).await;
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["name"], "konkyo");
        assert!(json["endpoints"].as_array().unwrap().iter().any(|e| e == "POST /query"));
    }
}
