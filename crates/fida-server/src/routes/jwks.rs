//! Public key discovery: `/.well-known/platform.jwks.json` and
//! `/tenants/{id}/.well-known/jwks.json`. Both are unauthenticated.

use axum::extract::{Path, State};
use axum::Json;
use fida_spec::FidaError;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Jwk {
    kty: &'static str,
    crv: &'static str,
    #[serde(rename = "use")]
    use_: &'static str,
    kid: String,
    /// Ed25519 public key, base64url (already in JWK's expected encoding).
    x: String,
}

#[derive(Serialize)]
pub struct JwkSet {
    keys: Vec<Jwk>,
}

fn jwk(kid: String, public_key_b64u: String) -> Jwk {
    Jwk {
        kty: "OKP",
        crv: "Ed25519",
        use_: "sig",
        kid,
        x: public_key_b64u,
    }
}

/// `GET /.well-known/platform.jwks.json`
pub async fn platform_jwks(State(state): State<AppState>) -> Result<Json<JwkSet>, ApiError> {
    let platform = state
        .engine()
        .store()
        .get_platform_state()
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .ok_or(FidaError::NotFound)?;
    Ok(Json(JwkSet {
        keys: vec![jwk(platform.kid, platform.public_key_b64u)],
    }))
}

/// `GET /tenants/{id}/.well-known/jwks.json`
pub async fn tenant_jwks(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<JwkSet>, ApiError> {
    let tenant = state
        .engine()
        .get_tenant(&tenant_id)?
        .ok_or(FidaError::NotFound)?;
    Ok(Json(JwkSet {
        keys: vec![jwk(tenant.kid, tenant.public_key_b64u)],
    }))
}
