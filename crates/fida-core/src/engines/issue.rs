//! The ledger engine's `issue_event` operation (specification §4.3).
//!
//! Callers must hold the per-tenant sequence-allocation lock for the
//! duration of this call — see [`crate::LedgerEngine::issue`].

use fida_crypto::hex_decode_32;
use fida_spec::{EventHeader, FidaError, FES_VERSION};
use fida_store::{EventRecord, Store, TenantRecord};
use rand_core::RngCore;

use crate::header::event_header_hash;
use crate::keys::KeyVault;

/// Inputs to `issue_event`, already authenticated and authorized.
pub struct IssueRequest {
    /// Arbitrary caller JSON payload.
    pub payload: serde_json::Value,
    /// Caller-supplied profile identifier.
    pub profile_id: String,
    /// Caller-supplied event type.
    pub event_type: String,
    /// Caller-supplied actor role.
    pub actor_role: String,
    /// Caller-supplied object reference (empty string allowed).
    pub object_ref: String,
    /// Optional idempotency key, scoped per tenant.
    pub idempotency_key: Option<String>,
}

/// Result of `issue_event`: the receipt and whether it was served from the
/// idempotency short-circuit rather than freshly written.
pub struct IssueOutcome {
    /// The full signed receipt.
    pub header: EventHeader,
    /// `sha256_hex` of the canonicalized header.
    pub event_hash: String,
    /// Base64url Ed25519 signature.
    pub signature_b64u: String,
    /// Whether this was a replay of a prior idempotent submission.
    pub idem_hit: bool,
    /// The checkpoint cut as a side effect of this issue call, if the
    /// opportunistic trigger fired. Always `None` from `issue_event` itself;
    /// [`crate::LedgerEngine::issue`] fills it in after the fact.
    pub checkpoint_cut: Option<fida_spec::Checkpoint>,
}

fn random_event_id() -> String {
    let mut bytes = [0u8; 16];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Append a new event for `tenant`, or replay the prior one if
/// `request.idempotency_key` was already seen for this tenant.
pub fn issue_event(
    store: &Store,
    vault: &KeyVault,
    tenant: &TenantRecord,
    request: IssueRequest,
) -> Result<IssueOutcome, FidaError> {
    if let Some(idem_key) = &request.idempotency_key {
        if let Some(existing) = store
            .find_by_idempotency_key(&tenant.tenant_id, idem_key)
            .map_err(|e| FidaError::Internal(e.to_string()))?
        {
            return Ok(IssueOutcome {
                header: existing.header,
                event_hash: existing.event_hash,
                signature_b64u: existing.signature_b64u,
                idem_hit: true,
                checkpoint_cut: None,
            });
        }
    }

    let payload_canon = fida_canon::canonicalize_value(&request.payload)
        .map_err(|e| FidaError::Validation(format!("payload did not canonicalize: {e}")))?;
    let payload_hash = fida_crypto::sha256_hex(&payload_canon);

    let seq = store
        .peek_next_seq(&tenant.tenant_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    let prev_event_hash = if seq > 1 {
        let prev = store
            .get_event(&tenant.tenant_id, seq - 1)
            .map_err(|e| FidaError::Internal(e.to_string()))?
            .ok_or_else(|| {
                FidaError::IntegrityViolation(format!(
                    "missing predecessor event for tenant {} at seq {}",
                    tenant.tenant_id,
                    seq - 1
                ))
            })?;
        Some(prev.event_hash)
    } else {
        None
    };

    let header = EventHeader {
        version: FES_VERSION.to_string(),
        tenant_id: tenant.tenant_id.clone(),
        event_id: random_event_id(),
        seq,
        issued_at: chrono::Utc::now().to_rfc3339(),
        profile_id: request.profile_id,
        event_type: request.event_type,
        actor_role: request.actor_role,
        object_ref: request.object_ref,
        payload_hash,
        prev_event_hash,
        kid: tenant.kid.clone(),
        canon_alg: fida_canon::CANON_ALG.to_string(),
        hash_alg: fida_crypto::HASH_ALG.to_string(),
    };

    let event_hash = event_header_hash(&header)?;
    let digest = hex_decode_32(&event_hash)?;
    let identity = vault.open(&tenant.sealed_seed_b64u)?;
    let signature_b64u = identity.sign_digest(&digest);

    let record = EventRecord {
        header: header.clone(),
        event_hash: event_hash.clone(),
        signature_b64u: signature_b64u.clone(),
        idempotency_key: request.idempotency_key,
        leaf_index: None,
        checkpoint_id: None,
    };
    store
        .append_event(&record)
        .map_err(|e| FidaError::IntegrityViolation(e.to_string()))?;

    Ok(IssueOutcome {
        header,
        event_hash,
        signature_b64u,
        idem_hit: false,
        checkpoint_cut: None,
    })
}
