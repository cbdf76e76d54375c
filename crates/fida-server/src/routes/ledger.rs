//! `/issue` and `/verify` — the two hot-path ledger endpoints.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use fida_core::IssueRequest;
use fida_spec::{FidaError, Receipt, ReceiptInput, Role, VerifyResult};
use serde::Deserialize;

use crate::error::ApiError;
use crate::guard::{require_any_authenticated, require_authenticated, require_tenant};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct IssueBody {
    tenant_id: String,
    payload: serde_json::Value,
    profile_id: String,
    event_type: String,
    actor_role: String,
    #[serde(default)]
    object_ref: String,
}

/// `POST /issue` — `tenant_id` in the body must match the issuer key's own
/// scope; a key minted for tenant A cannot write into tenant B even if it
/// names B explicitly.
pub async fn issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IssueBody>,
) -> Result<Json<Receipt>, ApiError> {
    let principal = require_authenticated(&state, &headers, &[Role::Issuer])?;
    require_tenant(&principal, &body.tenant_id)?;
    let tenant_id = body.tenant_id;
    let tenant = state
        .engine()
        .get_tenant(&tenant_id)?
        .ok_or(FidaError::NotFound)?;

    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .engine()
        .issue(
            &tenant,
            IssueRequest {
                payload: body.payload,
                profile_id: body.profile_id,
                event_type: body.event_type,
                actor_role: body.actor_role,
                object_ref: body.object_ref,
                idempotency_key,
            },
        )
        .await?;

    state
        .metrics()
        .events_issued_total
        .with_label_values(&[tenant_id.as_str()])
        .inc();
    if outcome.checkpoint_cut.is_some() {
        state
            .metrics()
            .checkpoints_total
            .with_label_values(&[tenant_id.as_str()])
            .inc();
    }

    Ok(Json(Receipt {
        header: outcome.header,
        event_hash: outcome.event_hash,
        signature_b64u: outcome.signature_b64u,
    }))
}

/// `POST /verify` — every field of the body is optional so an absent key
/// (as opposed to an empty string) is reported through `VerifyResult`
/// rather than rejected by the extractor with a 400.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ReceiptInput>,
) -> Result<Json<VerifyResult>, ApiError> {
    let principal = require_any_authenticated(&state, &headers)?;

    if let Some(result) = input.missing_result() {
        return Ok(Json(result));
    }

    let tenant_id = input.tenant_id.clone().unwrap_or_default();
    require_tenant(&principal, &tenant_id)?;
    let tenant = state
        .engine()
        .get_tenant(&tenant_id)?
        .ok_or(FidaError::NotFound)?;
    let result = state.engine().verify(&tenant, &input)?;
    Ok(Json(result))
}
