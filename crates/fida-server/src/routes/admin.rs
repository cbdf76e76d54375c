//! `/admin/*` — platform bootstrap, tenant provisioning, API key minting.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use fida_spec::{FidaError, Role};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::guard::{require_authenticated, require_bootstrap_token};
use crate::state::AppState;

#[derive(Serialize)]
pub struct MintedKeyResponse {
    key_id: String,
    api_key: String,
}

/// `POST /admin/bootstrap`
pub async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MintedKeyResponse>, ApiError> {
    require_bootstrap_token(&state, &headers)?;
    let minted = state.engine().bootstrap()?;
    Ok(Json(MintedKeyResponse {
        key_id: minted.key_id,
        api_key: minted.presented,
    }))
}

/// `POST /admin/bootstrap/lock`
pub async fn bootstrap_lock(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(), ApiError> {
    require_authenticated(&state, &headers, &[Role::Admin])?;
    state.engine().lock_bootstrap()?;
    Ok(())
}

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    tenant_id: String,
}

#[derive(Serialize)]
pub struct TenantResponse {
    tenant_id: String,
    kid: String,
    public_key_b64u: String,
    created_at: String,
}

/// `POST /admin/tenants`
pub async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTenantRequest>,
) -> Result<Json<TenantResponse>, ApiError> {
    require_authenticated(&state, &headers, &[Role::Admin])?;
    let tenant = state.engine().create_tenant(&body.tenant_id)?;
    Ok(Json(TenantResponse {
        tenant_id: tenant.tenant_id,
        kid: tenant.kid,
        public_key_b64u: tenant.public_key_b64u,
        created_at: tenant.created_at,
    }))
}

#[derive(Deserialize)]
pub struct IssueApiKeyRequest {
    role: String,
    tenant_id: Option<String>,
}

/// `POST /admin/apikeys/issue`
pub async fn issue_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IssueApiKeyRequest>,
) -> Result<Json<MintedKeyResponse>, ApiError> {
    require_authenticated(&state, &headers, &[Role::Admin])?;
    let role = Role::parse(&body.role)
        .ok_or_else(|| FidaError::Validation(format!("unknown role: {}", body.role)))?;
    let minted = state.engine().issue_api_key(role, body.tenant_id)?;
    Ok(Json(MintedKeyResponse {
        key_id: minted.key_id,
        api_key: minted.presented,
    }))
}
