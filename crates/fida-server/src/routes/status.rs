//! `/health`, `/ready`, `/metrics` — public liveness, readiness, and
//! Prometheus scrape endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    bootstrapped: bool,
}

/// `GET /health` — always 200 once the process is serving requests.
pub async fn health() -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        bootstrapped: true,
    })
}

/// `GET /ready` — 200 once the store is reachable and bootstrap has run.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine().store().get_platform_state() {
        Ok(Some(platform)) => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ready",
                bootstrapped: !platform.kid.is_empty(),
            }),
        ),
        Ok(None) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: "not_bootstrapped",
                bootstrapped: false,
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: "store_unreachable",
                bootstrapped: false,
            }),
        ),
    }
}

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics().render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {err}"))
                .into_response()
        }
    }
}
