//! Request-boundary policy: authentication, rate limiting, and
//! authorization, applied at the top of each handler before it touches the
//! ledger engine.

use axum::http::HeaderMap;
use fida_core::auth::{authenticate, authenticate_bootstrap, require_role, require_tenant_match, Principal};
use fida_spec::{FidaError, Role};

use crate::state::AppState;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Authenticate `x-api-key`, enforce the per-key-id rate limit, then require
/// the principal hold one of `allowed_roles`.
pub fn require_authenticated(
    state: &AppState,
    headers: &HeaderMap,
    allowed_roles: &[Role],
) -> Result<Principal, FidaError> {
    let presented = header_value(headers, "x-api-key").ok_or(FidaError::AuthMissing)?;
    let principal = authenticate(state.engine().store(), presented)?;
    state
        .rate_limiter()
        .check(&principal.key_id)
        .map_err(|_| FidaError::RateLimited)?;
    require_role(&principal, allowed_roles)?;
    Ok(principal)
}

/// Authenticate `x-api-key` and enforce the rate limit without requiring a
/// specific role (used by `/verify`, which accepts any authenticated key).
pub fn require_any_authenticated(state: &AppState, headers: &HeaderMap) -> Result<Principal, FidaError> {
    let presented = header_value(headers, "x-api-key").ok_or(FidaError::AuthMissing)?;
    let principal = authenticate(state.engine().store(), presented)?;
    state
        .rate_limiter()
        .check(&principal.key_id)
        .map_err(|_| FidaError::RateLimited)?;
    Ok(principal)
}

/// Require the principal's tenant scope match `target_tenant_id` (platform
/// admins, whose `tenant_id` is `None`, always pass).
pub fn require_tenant(principal: &Principal, target_tenant_id: &str) -> Result<(), FidaError> {
    require_tenant_match(principal, target_tenant_id)
}

/// Verify `x-bootstrap-token` against the configured secret.
pub fn require_bootstrap_token(state: &AppState, headers: &HeaderMap) -> Result<(), FidaError> {
    let presented = header_value(headers, "x-bootstrap-token").ok_or(FidaError::AuthMissing)?;
    authenticate_bootstrap(&state.config().bootstrap_token, presented)
}
