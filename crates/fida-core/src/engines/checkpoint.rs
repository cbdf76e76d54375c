//! The checkpoint engine's `maybe_checkpoint` operation (specification
//! §4.5). Callers must hold the tenant's checkpoint advisory lock.

use fida_spec::{Checkpoint, CheckpointHeader, FidaError};
use fida_store::{Store, TenantRecord};

use crate::header::checkpoint_header_bytes;
use crate::keys::KeyVault;

/// Attempt to cut a new checkpoint for `tenant`. Returns `None` without
/// making any change if fewer than `batch_size` events are uncheckpointed.
pub fn maybe_checkpoint(
    store: &Store,
    vault: &KeyVault,
    platform_kid: &str,
    platform_seed_sealed_b64u: &str,
    tenant: &TenantRecord,
    batch_size: u64,
) -> Result<Option<Checkpoint>, FidaError> {
    let (last_checkpoint_id, last_checkpointed) = store
        .checkpoint_cursor(&tenant.tenant_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    let next_seq = store
        .peek_next_seq(&tenant.tenant_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    let last_written_seq = next_seq.saturating_sub(1);
    let pending = last_written_seq.saturating_sub(last_checkpointed);
    if pending < batch_size {
        return Ok(None);
    }

    let from_seq = last_checkpointed + 1;
    let to_seq = from_seq + batch_size - 1;
    let batch = store
        .list_events_range(&tenant.tenant_id, from_seq, to_seq)
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    if batch.len() as u64 != batch_size {
        return Err(FidaError::IntegrityViolation(format!(
            "expected {batch_size} uncheckpointed events for tenant {}, found {}",
            tenant.tenant_id,
            batch.len()
        )));
    }

    let leaves: Vec<String> = batch.iter().map(|e| e.event_hash.clone()).collect();
    let (root_hash, layers) = fida_merkle::build(&leaves);
    let page_hash = fida_merkle::page_hash(&leaves);

    let header = CheckpointHeader {
        tenant_id: tenant.tenant_id.clone(),
        from_seq,
        to_seq,
        leaf_count: batch_size,
        root_hash,
        page_hash,
        issued_at: chrono::Utc::now().to_rfc3339(),
        platform_kid: platform_kid.to_string(),
    };
    let header_bytes = checkpoint_header_bytes(&header)?;
    let platform_identity = vault.open(platform_seed_sealed_b64u)?;
    let signature_b64u = platform_identity.sign_bytes(&header_bytes);

    let checkpoint = Checkpoint {
        id: last_checkpoint_id + 1,
        header,
        signature_b64u,
    };

    store
        .commit_checkpoint(&checkpoint, &layers, &leaves)
        .map_err(|e| FidaError::IntegrityViolation(e.to_string()))?;

    Ok(Some(checkpoint))
}
