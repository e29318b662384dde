use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Body served on the metrics endpoint when no recorder is installed.
pub const NO_RECORDER: &str = "no metrics recorder installed";

static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder. Only the first call installs it,
/// later calls return a handle to the same recorder.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    RECORDER
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .set_buckets(EXPONENTIAL_SECONDS)?
                .install_recorder()
        })
        .cloned()
}

/// Prometheus text exposition, or a placeholder without a recorder.
pub fn render(handle: Option<&PrometheusHandle>) -> String {
    match handle {
        Some(handle) => handle.render(),
        None => NO_RECORDER.to_string(),
    }
}

/// Middleware to record some common HTTP metrics
/// Someday tower-http might provide a metrics middleware: https://github.com/tower-rs/tower-http/issues/57
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
