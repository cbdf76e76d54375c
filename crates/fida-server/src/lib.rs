//! The HTTP surface of the ledger service: route wiring, the shared
//! [`AppState`], request-boundary policy, and error mapping. Split out of
//! `main.rs` so integration tests can build the router directly with
//! `tower::ServiceExt::oneshot` instead of spawning a real listener.

pub mod error;
pub mod guard;
pub mod metrics;
pub mod routes;
pub mod state;

use std::time::Instant;

use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::http::HeaderName;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub use metrics::Metrics;
pub use state::AppState;

/// Records `fida_requests_total` and `fida_request_latency_ms` for every
/// request, labeled by the route's path template (not the raw URI, so
/// `/proof/:tenant/:event_id` doesn't fragment into one series per event).
async fn track_metrics(
    matched_path: Option<MatchedPath>,
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched_path.map(|p| p.as_str().to_string()).unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16().to_string();
    state.metrics().requests_total.with_label_values(&[&route, &status]).inc();
    state.metrics().request_latency_ms.with_label_values(&[&route]).observe(elapsed_ms);
    response
}

/// Build the full router over `state`, with CORS, body-size capping, and
/// request tracing applied the same way in tests as in production.
pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.config().max_body_bytes;
    let cors = if state.config().allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config()
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/admin/bootstrap", post(routes::admin::bootstrap))
        .route("/admin/bootstrap/lock", post(routes::admin::bootstrap_lock))
        .route("/admin/tenants", post(routes::admin::create_tenant))
        .route("/admin/apikeys/issue", post(routes::admin::issue_api_key))
        .route("/issue", post(routes::ledger::issue))
        .route("/verify", post(routes::ledger::verify))
        .route("/export/:tenant", get(routes::export::export))
        .route("/proof/:tenant/:event_id", get(routes::export::proof))
        .route("/.well-known/platform.jwks.json", get(routes::jwks::platform_jwks))
        .route("/tenants/:id/.well-known/jwks.json", get(routes::jwks::tenant_jwks))
        .route("/health", get(routes::status::health))
        .route("/ready", get(routes::status::ready))
        .route("/metrics", get(routes::status::metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid::default(),
        ))
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
}
