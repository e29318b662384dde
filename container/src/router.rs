use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use health::HealthAggregator;
use metrics_exporter_prometheus::PrometheusHandle;
use serve_metrics::{render, track_metrics};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

pub const LIVENESS_PATH: &str = "/live";
pub const READINESS_PATH: &str = "/ready";
pub const METRICS_PATH: &str = "/metrics";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Status endpoints plus the application's own routes.
///
/// Application routes must not reuse the status paths, axum panics on
/// overlapping routes when they are merged.
#[derive(Clone)]
pub struct AppRouter {
    health: HealthAggregator,
    routes: Router,
    metrics: Option<PrometheusHandle>,
}

impl AppRouter {
    pub fn new(health: HealthAggregator) -> Self {
        Self {
            health,
            routes: Router::new(),
            metrics: None,
        }
    }

    pub fn merge(&mut self, routes: Router) {
        self.routes = std::mem::take(&mut self.routes).merge(routes);
    }

    pub fn set_metrics(&mut self, handle: PrometheusHandle) {
        self.metrics = Some(handle);
    }

    pub fn has_metrics(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn build(&self) -> Router {
        let live = self.health.clone();
        let ready = self.health.clone();
        let metrics = self.metrics.clone();

        Router::new()
            .route(
                LIVENESS_PATH,
                get(move || std::future::ready(live.liveness())),
            )
            .route(
                READINESS_PATH,
                get(move || {
                    let ready = ready.clone();
                    async move { ready.readiness().await }
                }),
            )
            .route(
                METRICS_PATH,
                get(move || std::future::ready(render(metrics.as_ref()))),
            )
            .merge(self.routes.clone())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(axum::middleware::from_fn(track_metrics))
    }
}

/// Request ids are set by the outer layer, or kept when the client sent one.
fn request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .unwrap_or_default();
    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}
