//! The proof engine: locate an event's checkpoint binding and reconstruct
//! its Merkle inclusion proof from the persisted tree layers.

use fida_merkle::Proof;
use fida_spec::FidaError;
use fida_store::Store;

/// Build the inclusion proof for `event_id` under `tenant_id`.
///
/// Returns `FidaError::NotFound` if the event does not exist or has not
/// yet been bound to a checkpoint (proofs only exist once a checkpoint has
/// covered the event).
pub fn build_proof(store: &Store, tenant_id: &str, event_id: &str) -> Result<Proof, FidaError> {
    let event = store
        .get_event_by_event_id(tenant_id, event_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .ok_or(FidaError::NotFound)?;

    let checkpoint_id = event.checkpoint_id.ok_or(FidaError::NotFound)?;
    let leaf_index = event.leaf_index.ok_or(FidaError::NotFound)?;

    let layers = store
        .get_merkle_layers(tenant_id, checkpoint_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .ok_or_else(|| {
            FidaError::IntegrityViolation(format!(
                "event bound to checkpoint {checkpoint_id} but its Merkle layers are missing"
            ))
        })?;

    fida_merkle::prove(&layers, leaf_index as usize).ok_or_else(|| {
        FidaError::IntegrityViolation(format!(
            "leaf index {leaf_index} out of range for checkpoint {checkpoint_id}"
        ))
    })
}
