//! `/export/{tenant}` and `/proof/{tenant}/{event_id}` — exporter-facing
//! read endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use fida_spec::{Checkpoint, ExportEnvelope, FidaError, Receipt, Role};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::guard::{require_authenticated, require_tenant};
use crate::state::AppState;

const DEFAULT_EXPORT_LIMIT: usize = 100;
const MAX_EXPORT_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct ExportQuery {
    cursor: Option<u64>,
    limit: Option<usize>,
    #[allow(dead_code)]
    fmt: Option<String>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    events: Vec<Receipt>,
    envelope: ExportEnvelope,
    latest_checkpoint: Option<Checkpoint>,
    next_cursor: Option<u64>,
}

/// `GET /export/{tenant}?cursor=&limit=&fmt=`
pub async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ExportResponse>, ApiError> {
    let principal = require_authenticated(&state, &headers, &[Role::Exporter, Role::Admin])?;
    require_tenant(&principal, &tenant_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_EXPORT_LIMIT).min(MAX_EXPORT_LIMIT);
    let store = state.engine().store();
    let records = store
        .list_events_after(&tenant_id, query.cursor.unwrap_or(0), limit)
        .map_err(|e| FidaError::Internal(e.to_string()))?;

    let hashes: Vec<String> = records.iter().map(|r| r.event_hash.clone()).collect();
    let envelope = ExportEnvelope {
        from_root: records
            .first()
            .and_then(|r| r.header.prev_event_hash.clone())
            .unwrap_or_default(),
        to_root: records.last().map(|r| r.event_hash.clone()).unwrap_or_default(),
        size: records.len(),
        page_hash: fida_merkle::page_hash(&hashes),
    };
    let next_cursor = records.last().map(|r| r.header.seq);

    let (last_checkpoint_id, _) = store
        .checkpoint_cursor(&tenant_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    let latest_checkpoint = if last_checkpoint_id > 0 {
        store
            .get_checkpoint(&tenant_id, last_checkpoint_id)
            .map_err(|e| FidaError::Internal(e.to_string()))?
    } else {
        None
    };

    let events = records
        .into_iter()
        .map(|r| Receipt {
            header: r.header,
            event_hash: r.event_hash,
            signature_b64u: r.signature_b64u,
        })
        .collect();

    Ok(Json(ExportResponse {
        events,
        envelope,
        latest_checkpoint,
        next_cursor,
    }))
}

/// `GET /proof/{tenant}/{event_id}`
pub async fn proof(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((tenant_id, event_id)): Path<(String, String)>,
) -> Result<Json<fida_merkle::Proof>, ApiError> {
    let principal =
        require_authenticated(&state, &headers, &[Role::Verifier, Role::Exporter, Role::Admin])?;
    require_tenant(&principal, &tenant_id)?;
    let proof = state.engine().proof(&tenant_id, &event_id)?;
    Ok(Json(proof))
}
