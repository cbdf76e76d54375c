//! The four core engines, each a direct translation of one algorithm in
//! the component design: issuance, checkpointing, verification, and proof
//! reconstruction. Kept as free functions operating on `&Store`/`&KeyVault`
//! so [`crate::LedgerEngine`] only has to own the locking discipline around
//! them.

/// `maybe_checkpoint` — batches uncheckpointed events into a signed Merkle
/// checkpoint once a full batch accumulates.
pub mod checkpoint;
/// `issue_event` — canonicalize, allocate sequence, hash, sign, persist.
pub mod issue;
/// Merkle inclusion proof reconstruction for a single event.
pub mod proof;
/// `verify_receipt` — recompute hash, verify signature, check chain hint.
pub mod verify;
