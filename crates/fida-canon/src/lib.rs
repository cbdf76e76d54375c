//! Deterministic JSON encoding for ledger hashing.
//!
//! The ledger hashes its event headers and checkpoint headers as bytes, not
//! as structured values, so two independent parties must derive
//! bit-identical bytes for the same logical JSON value. This crate wraps
//! [RFC 8785](https://www.rfc-editor.org/rfc/rfc8785) (JCS) so callers never
//! have to hand-roll a "sorted keys, compact JSON" shortcut — number
//! formatting differences between that shortcut and JCS silently break
//! verification for any payload containing non-integer numbers.
#![deny(missing_docs)]

use serde::Serialize;
use thiserror::Error;

/// The fixed label this workspace advertises for its canonicalization
/// profile. Embedded in every signed event and checkpoint header so
/// verifiers know which algorithm produced the bytes they must reproduce.
pub const CANON_ALG: &str = "RFC8785";

/// Errors produced while canonicalizing a value.
#[derive(Debug, Error)]
pub enum CanonError {
    /// The value could not be converted to a `serde_json::Value`.
    #[error("value serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    /// `serde_jcs` rejected the value (e.g. a non-finite float).
    #[error("JCS encoding failed: {0}")]
    Jcs(String),
}

/// Canonicalize an arbitrary serializable value into RFC 8785 JCS bytes.
///
/// Object keys are sorted by UTF-16 code unit, numbers are rendered per
/// the ECMAScript `Number::toString` algorithm, and no insignificant
/// whitespace is emitted.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    let value = serde_json::to_value(value)?;
    canonicalize_value(&value)
}

/// Canonicalize a [`serde_json::Value`] directly, skipping the
/// serialize-to-`Value` round trip callers of [`canonicalize`] pay.
pub fn canonicalize_value(value: &serde_json::Value) -> Result<Vec<u8>, CanonError> {
    serde_jcs::to_string(value)
        .map(|s| s.into_bytes())
        .map_err(|err| CanonError::Jcs(err.to_string()))
}
