//! The verification engine's `verify_receipt` operation (specification
//! §4.6). Never raises on bad input — every outcome is reported through
//! [`VerifyResult`].

use fida_crypto::hex_decode_32;
use fida_spec::{FidaError, ReasonCode, ReceiptInput, VerifyResult};
use fida_store::{Store, TenantRecord};

use crate::header::event_header_hash;

/// Verify `input` against `tenant`'s current public key.
///
/// Never rejects a malformed body with a hard error: a receipt missing
/// required fields yields `valid=false` with `reason_codes=["missing:..."]`
/// (specification §4.6 step 1), not an HTTP-layer failure.
///
/// `chain_hint_ok` probes the local store for the claimed predecessor; an
/// offline caller with no store access should treat this check as
/// unavailable rather than calling this function at all.
pub fn verify_receipt(
    store: &Store,
    tenant: &TenantRecord,
    input: &ReceiptInput,
) -> Result<VerifyResult, FidaError> {
    if let Some(result) = input.missing_result() {
        return Ok(result);
    }
    let receipt = input
        .clone()
        .into_receipt()
        .ok_or_else(|| FidaError::Internal("receipt conversion failed after presence check".into()))?;

    let mut reason_codes = Vec::new();

    let computed_event_hash = event_header_hash(&receipt.header)?;
    let hash_valid = computed_event_hash == receipt.event_hash;
    if !hash_valid {
        reason_codes.push(ReasonCode::HashInvalid.as_wire());
    }

    let public_key_b64u = if receipt.header.kid == tenant.kid {
        Some(tenant.public_key_b64u.clone())
    } else {
        None
    };
    let signature_valid = match &public_key_b64u {
        Some(pub_b64u) => match hex_decode_32(&receipt.event_hash) {
            Ok(digest) => fida_crypto::verify(pub_b64u, &digest, &receipt.signature_b64u).unwrap_or(false),
            Err(_) => false,
        },
        None => {
            reason_codes.push(ReasonCode::UnknownKid.as_wire());
            false
        }
    };
    if public_key_b64u.is_some() && !signature_valid {
        reason_codes.push(ReasonCode::SigInvalid.as_wire());
    }

    let chain_hint_ok = match &receipt.header.prev_event_hash {
        None => true,
        Some(prev_hash) => {
            let found = store
                .get_event_by_hash(prev_hash)
                .map_err(|e| FidaError::Internal(e.to_string()))?
                .is_some();
            if !found {
                reason_codes.push(ReasonCode::PrevHashMissing.as_wire());
            }
            found
        }
    };

    Ok(VerifyResult {
        valid: signature_valid && hash_valid,
        signature_valid,
        hash_valid,
        chain_hint_ok,
        reason_codes,
        computed_event_hash: Some(computed_event_hash),
    })
}
