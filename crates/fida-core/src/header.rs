//! Canonical hashing of event and checkpoint headers. Shared between the
//! ledger engine (which computes these at issuance) and the verification
//! engine (which recomputes them from a submitted receipt).

use fida_spec::{CheckpointHeader, EventHeader, FidaError};

/// `sha256_hex(canonical_json_bytes(header))` — the event's `event_hash`.
pub fn event_header_hash(header: &EventHeader) -> Result<String, FidaError> {
    let canon = fida_canon::canonicalize(header)
        .map_err(|e| FidaError::Crypto(format!("header canonicalization failed: {e}")))?;
    Ok(fida_crypto::sha256_hex(&canon))
}

/// Canonical bytes of a checkpoint header, the message the platform key
/// signs directly (not a digest of it, unlike event signing).
pub fn checkpoint_header_bytes(header: &CheckpointHeader) -> Result<Vec<u8>, FidaError> {
    fida_canon::canonicalize(header)
        .map_err(|e| FidaError::Crypto(format!("header canonicalization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fida_spec::FES_VERSION;

    #[test]
    fn event_header_hash_is_deterministic() {
        let header = EventHeader {
            version: FES_VERSION.to_string(),
            tenant_id: "acme".into(),
            event_id: "a".repeat(32),
            seq: 1,
            issued_at: "2026-01-01T00:00:00Z".into(),
            profile_id: "p1".into(),
            event_type: "t1".into(),
            actor_role: "agent".into(),
            object_ref: "".into(),
            payload_hash: "b".repeat(64),
            prev_event_hash: None,
            kid: "acme-key-1".into(),
            canon_alg: "RFC8785".into(),
            hash_alg: "SHA-256".into(),
        };
        let h1 = event_header_hash(&header).unwrap();
        let h2 = event_header_hash(&header).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
