//! API routes.

use std::path::Path;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{cancel_job, get_job_status, health, list_jobs, submit_render};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, redact_internal_errors, request_id, request_logging,
    security_headers, RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let job_routes = Router::new()
        .route("/render", post(submit_render))
        .route("/status/:job_id", get(get_job_status))
        .route("/cancel/:job_id", delete(cancel_job))
        .route("/jobs", get(list_jobs))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new().route("/health", get(health));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    let videos = video_service(&state.renders.config().output_dir());

    let mut router = Router::new()
        .merge(job_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .nest_service("/videos", videos);

    // Don't expose internal error details in production
    if state.config.is_production() {
        router = router.layer(middleware::from_fn(redact_internal_errors));
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// Static service for published outputs. Job working directories are not
/// below `output_dir`, so fetched inputs and intermediates are never served.
fn video_service(output_dir: &Path) -> ServeDir {
    ServeDir::new(output_dir).append_index_html_on_directories(false)
}
