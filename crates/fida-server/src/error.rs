//! Maps `FidaError` onto HTTP responses per the propagation policy: only
//! validation/auth/not-found/rate-limit/timeout errors expose their detail
//! to the caller; everything else is logged with a request id and answered
//! with a generic body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fida_spec::FidaError;
use serde::Serialize;
use tracing::error;

/// Wraps a `FidaError` so it can be returned directly from an axum handler.
pub struct ApiError(pub FidaError);

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = if self.0.is_user_visible() {
            self.0.detail_code().to_string()
        } else {
            error!(error = %self.0, "internal error");
            "internal_error".to_string()
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<FidaError> for ApiError {
    fn from(err: FidaError) -> Self {
        ApiError(err)
    }
}
