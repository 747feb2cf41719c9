//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
///
/// Returns a handle that renders the exposition text. Render job metrics
/// recorded by the worker land in the same recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "slidecast_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "slidecast_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "slidecast_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "slidecast_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", route_label(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse job ids and file names so label cardinality stays bounded.
fn route_label(path: &str) -> String {
    let mut segments = path.trim_start_matches('/').split('/');
    match segments.next() {
        Some(root @ ("status" | "cancel")) if segments.next().is_some() => format!("/{}/:job_id", root),
        Some("videos") => "/videos/*".to_string(),
        _ => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => route_label(matched.as_str()),
        None => route_label(request.uri().path()),
    };
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("/status/5b7d0c2e-1f"), "/status/:job_id");
        assert_eq!(route_label("/status/:job_id"), "/status/:job_id");
        assert_eq!(route_label("/cancel/abc"), "/cancel/:job_id");
        assert_eq!(route_label("/videos/abc/output.mp4"), "/videos/*");
        assert_eq!(route_label("/render"), "/render");
        assert_eq!(route_label("/status"), "/status");
    }
}
