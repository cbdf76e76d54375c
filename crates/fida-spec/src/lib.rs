//! Shared wire types, error taxonomy, and environment configuration for the
//! event ledger. Kept free of any HTTP-framework dependency so the engines
//! in `fida-core` and the tests in `fida-server` can both depend on it.
#![deny(missing_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format version embedded in every signed header.
pub const FES_VERSION: &str = "FES-1.0";

/// Role granted to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access: bootstrap, tenant and key management.
    Admin,
    /// May call `/issue`.
    Issuer,
    /// May call `/verify` and `/proof`.
    Verifier,
    /// May call `/export` and `/proof`.
    Exporter,
}

impl Role {
    /// Parse a role from its lowercase wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "issuer" => Some(Role::Issuer),
            "verifier" => Some(Role::Verifier),
            "exporter" => Some(Role::Exporter),
            _ => None,
        }
    }

    /// The lowercase wire name for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Issuer => "issuer",
            Role::Verifier => "verifier",
            Role::Exporter => "exporter",
        }
    }
}

/// The canonical, signed header of a ledger event. Hashing these exact
/// fourteen keys (in any order — canonicalization sorts them) produces the
/// `event_hash` that is then signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Wire format version, always [`FES_VERSION`].
    pub version: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Globally unique 32-hex random identifier, drawn before hashing.
    pub event_id: String,
    /// Monotonic per-tenant sequence number, starting at 1.
    pub seq: u64,
    /// UTC ISO-8601 issuance timestamp.
    pub issued_at: String,
    /// Caller-supplied profile identifier.
    pub profile_id: String,
    /// Caller-supplied event type.
    pub event_type: String,
    /// Caller-supplied actor role (free text, distinct from [`Role`]).
    pub actor_role: String,
    /// Caller-supplied object reference; empty string allowed.
    pub object_ref: String,
    /// `sha256_hex` of the canonicalized payload.
    pub payload_hash: String,
    /// `event_hash` of the prior event for this tenant, or JSON `null` for
    /// `seq == 1`.
    pub prev_event_hash: Option<String>,
    /// Key id of the tenant key that will sign this event.
    pub kid: String,
    /// Canonicalization algorithm label, always `"RFC8785"`.
    pub canon_alg: String,
    /// Hash algorithm label, always `"SHA-256"`.
    pub hash_alg: String,
}

/// The full receipt returned by `/issue` and accepted by `/verify`: the
/// signed header plus its hash and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The signed header fields.
    #[serde(flatten)]
    pub header: EventHeader,
    /// `sha256_hex` of the canonicalized header.
    pub event_hash: String,
    /// Base64url Ed25519 signature over the raw `event_hash` digest bytes.
    pub signature_b64u: String,
}

/// A `/verify` request body accepted leniently: every field is optional so
/// a receipt with an absent key fails verification through a structured
/// [`ReasonCode::Missing`] result rather than a blanket 400 from the
/// extractor. Field types otherwise match [`EventHeader`] and [`Receipt`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptInput {
    /// See [`EventHeader::version`].
    pub version: Option<String>,
    /// See [`EventHeader::tenant_id`].
    pub tenant_id: Option<String>,
    /// See [`EventHeader::event_id`].
    pub event_id: Option<String>,
    /// See [`EventHeader::seq`].
    pub seq: Option<u64>,
    /// See [`EventHeader::issued_at`].
    pub issued_at: Option<String>,
    /// See [`EventHeader::profile_id`].
    pub profile_id: Option<String>,
    /// See [`EventHeader::event_type`].
    pub event_type: Option<String>,
    /// See [`EventHeader::actor_role`].
    pub actor_role: Option<String>,
    /// See [`EventHeader::object_ref`]. Empty/absent is valid, never reported missing.
    pub object_ref: Option<String>,
    /// See [`EventHeader::payload_hash`].
    pub payload_hash: Option<String>,
    /// See [`EventHeader::prev_event_hash`]. `null`/absent is valid for `seq == 1`.
    pub prev_event_hash: Option<String>,
    /// See [`EventHeader::kid`].
    pub kid: Option<String>,
    /// See [`EventHeader::canon_alg`].
    pub canon_alg: Option<String>,
    /// See [`EventHeader::hash_alg`].
    pub hash_alg: Option<String>,
    /// See [`Receipt::event_hash`].
    pub event_hash: Option<String>,
    /// See [`Receipt::signature_b64u`].
    pub signature_b64u: Option<String>,
}

impl ReceiptInput {
    /// Names of required fields that are absent or empty, in check order.
    /// `object_ref` and `prev_event_hash` are never reported: both have a
    /// valid empty/null value.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.version.as_deref().unwrap_or("").is_empty() {
            missing.push("version".to_string());
        }
        if self.tenant_id.as_deref().unwrap_or("").is_empty() {
            missing.push("tenant_id".to_string());
        }
        if self.event_id.as_deref().unwrap_or("").is_empty() {
            missing.push("event_id".to_string());
        }
        if self.seq.is_none() {
            missing.push("seq".to_string());
        }
        if self.issued_at.as_deref().unwrap_or("").is_empty() {
            missing.push("issued_at".to_string());
        }
        if self.profile_id.as_deref().unwrap_or("").is_empty() {
            missing.push("profile_id".to_string());
        }
        if self.event_type.as_deref().unwrap_or("").is_empty() {
            missing.push("event_type".to_string());
        }
        if self.actor_role.as_deref().unwrap_or("").is_empty() {
            missing.push("actor_role".to_string());
        }
        if self.payload_hash.as_deref().unwrap_or("").is_empty() {
            missing.push("payload_hash".to_string());
        }
        if self.kid.as_deref().unwrap_or("").is_empty() {
            missing.push("kid".to_string());
        }
        if self.canon_alg.as_deref().unwrap_or("").is_empty() {
            missing.push("canon_alg".to_string());
        }
        if self.hash_alg.as_deref().unwrap_or("").is_empty() {
            missing.push("hash_alg".to_string());
        }
        if self.event_hash.as_deref().unwrap_or("").is_empty() {
            missing.push("event_hash".to_string());
        }
        if self.signature_b64u.as_deref().unwrap_or("").is_empty() {
            missing.push("signature_b64u".to_string());
        }
        missing
    }

    /// Build the full [`Receipt`], once `missing_fields` is empty. Returns
    /// `None` if called prematurely.
    pub fn into_receipt(self) -> Option<Receipt> {
        Some(Receipt {
            header: EventHeader {
                version: self.version?,
                tenant_id: self.tenant_id?,
                event_id: self.event_id?,
                seq: self.seq?,
                issued_at: self.issued_at?,
                profile_id: self.profile_id?,
                event_type: self.event_type?,
                actor_role: self.actor_role?,
                object_ref: self.object_ref.unwrap_or_default(),
                payload_hash: self.payload_hash?,
                prev_event_hash: self.prev_event_hash,
                kid: self.kid?,
                canon_alg: self.canon_alg?,
                hash_alg: self.hash_alg?,
            },
            event_hash: self.event_hash?,
            signature_b64u: self.signature_b64u?,
        })
    }

    /// The `VerifyResult` to short-circuit with if any required field is
    /// absent, or `None` if the receipt is complete enough to check.
    pub fn missing_result(&self) -> Option<VerifyResult> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            return None;
        }
        Some(VerifyResult {
            valid: false,
            signature_valid: false,
            hash_valid: false,
            chain_hint_ok: false,
            reason_codes: vec![ReasonCode::Missing(missing.join(",")).as_wire()],
            computed_event_hash: None,
        })
    }
}

impl From<Receipt> for ReceiptInput {
    fn from(receipt: Receipt) -> Self {
        ReceiptInput {
            version: Some(receipt.header.version),
            tenant_id: Some(receipt.header.tenant_id),
            event_id: Some(receipt.header.event_id),
            seq: Some(receipt.header.seq),
            issued_at: Some(receipt.header.issued_at),
            profile_id: Some(receipt.header.profile_id),
            event_type: Some(receipt.header.event_type),
            actor_role: Some(receipt.header.actor_role),
            object_ref: Some(receipt.header.object_ref),
            payload_hash: Some(receipt.header.payload_hash),
            prev_event_hash: receipt.header.prev_event_hash,
            kid: Some(receipt.header.kid),
            canon_alg: Some(receipt.header.canon_alg),
            hash_alg: Some(receipt.header.hash_alg),
            event_hash: Some(receipt.event_hash),
            signature_b64u: Some(receipt.signature_b64u),
        }
    }
}

/// The canonical, signed header of a checkpoint. Unlike event signing,
/// checkpoints sign these canonical header *bytes* directly rather than a
/// digest of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    /// Owning tenant.
    pub tenant_id: String,
    /// First sequence number bound by this checkpoint.
    pub from_seq: u64,
    /// Last sequence number bound by this checkpoint.
    pub to_seq: u64,
    /// `to_seq - from_seq + 1`.
    pub leaf_count: u64,
    /// Merkle root over the batch's event hashes.
    pub root_hash: String,
    /// `sha256_hex` of the ASCII-joined event hashes in the batch.
    pub page_hash: String,
    /// UTC ISO-8601 issuance timestamp.
    pub issued_at: String,
    /// Key id of the platform key that signed this checkpoint.
    pub platform_kid: String,
}

/// A persisted checkpoint: header fields plus its signature and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Storage identifier.
    pub id: u64,
    /// The signed header fields.
    #[serde(flatten)]
    pub header: CheckpointHeader,
    /// Base64url Ed25519 signature over the canonical header bytes.
    pub signature_b64u: String,
}

/// Closed set of machine-readable reason codes `verify_receipt` may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Signature did not verify against the resolved public key.
    SigInvalid,
    /// Recomputed header hash did not match `receipt.event_hash`.
    HashInvalid,
    /// `receipt.kid` did not resolve to a known key.
    UnknownKid,
    /// `prev_event_hash` was non-null but no matching event was found.
    PrevHashMissing,
    /// One or more required fields were absent; the field names follow as
    /// a comma-separated suffix, e.g. `"missing:tenant_id,seq"`.
    Missing(String),
}

impl ReasonCode {
    /// Render as the wire string form (`"missing:a,b"` for the variant
    /// that carries field names).
    pub fn as_wire(&self) -> String {
        match self {
            ReasonCode::SigInvalid => "sig_invalid".to_string(),
            ReasonCode::HashInvalid => "hash_invalid".to_string(),
            ReasonCode::UnknownKid => "unknown_kid".to_string(),
            ReasonCode::PrevHashMissing => "prev_hash_missing".to_string(),
            ReasonCode::Missing(fields) => format!("missing:{fields}"),
        }
    }
}

/// Result of verifying a receipt. Never raises for bad input; callers
/// inspect `valid` and `reason_codes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Overall verdict: `signature_valid && hash_valid`.
    pub valid: bool,
    /// Whether the Ed25519 signature verified.
    pub signature_valid: bool,
    /// Whether the recomputed header hash matched.
    pub hash_valid: bool,
    /// Advisory chain-hint check result; never affects `valid`.
    pub chain_hint_ok: bool,
    /// Machine-readable reasons, wire-encoded.
    pub reason_codes: Vec<String>,
    /// The hash this verifier computed from the receipt's header fields.
    pub computed_event_hash: Option<String>,
}

/// Export integrity envelope accompanying a page of `/export` results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEnvelope {
    /// `prev_event_hash` of the first row in the page, or empty string.
    pub from_root: String,
    /// `event_hash` of the last row in the page, or empty string.
    pub to_root: String,
    /// Number of events in the page.
    pub size: usize,
    /// `sha256_hex` of the ASCII-joined event hashes in the page.
    pub page_hash: String,
}

/// Error taxonomy for the ledger service. Variant names are the taxonomy,
/// not public type names — `fida-server` maps each to an HTTP status and
/// the propagation policy of deciding what is user-visible.
#[derive(Debug, Error)]
pub enum FidaError {
    /// Invalid or missing deployment configuration. Startup-fatal.
    #[error("configuration error: {0}")]
    Config(String),
    /// `x-api-key` (or `x-bootstrap-token`) header absent.
    #[error("authentication required")]
    AuthMissing,
    /// Presented credential does not resolve or has been revoked.
    #[error("invalid credentials")]
    AuthInvalid,
    /// Credential resolved but lacks the required role or tenant scope.
    #[error("access denied")]
    AuthzDenied,
    /// Referenced resource (tenant, event, checkpoint) does not exist.
    #[error("not found")]
    NotFound,
    /// A uniqueness or state conflict the caller can retry past (e.g. via
    /// idempotency key), or a bootstrap-already-locked conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Request body exceeded the configured cap.
    #[error("payload too large")]
    PayloadTooLarge,
    /// Caller exceeded the token-bucket rate limit.
    #[error("rate limited")]
    RateLimited,
    /// Malformed or semantically invalid request body.
    #[error("validation error: {0}")]
    Validation(String),
    /// A database uniqueness constraint surfaced unexpectedly (lost-update
    /// race on sequence allocation, corrupted persisted metadata, ...).
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// A cryptographic operation failed unexpectedly (key material
    /// malformed, AEAD failure outside the expected decrypt-failure path).
    #[error("crypto error: {0}")]
    Crypto(String),
    /// A database or downstream operation exceeded its deadline.
    #[error("timeout")]
    Timeout,
    /// Anything else; logged with a request id and reported generically.
    #[error("internal error")]
    Internal(String),
}

impl FidaError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            FidaError::Config(_) => 500,
            FidaError::AuthMissing => 401,
            FidaError::AuthInvalid | FidaError::AuthzDenied => 403,
            FidaError::NotFound => 404,
            FidaError::Conflict(_) => 409,
            FidaError::PayloadTooLarge => 413,
            FidaError::RateLimited => 429,
            FidaError::Validation(_) => 400,
            FidaError::IntegrityViolation(_) => 500,
            FidaError::Crypto(_) => 500,
            FidaError::Timeout => 503,
            FidaError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for the `{detail: "<code>"}` body.
    pub fn detail_code(&self) -> &'static str {
        match self {
            FidaError::Config(_) => "config_error",
            FidaError::AuthMissing => "auth_missing",
            FidaError::AuthInvalid => "auth_invalid",
            FidaError::AuthzDenied => "authz_denied",
            FidaError::NotFound => "not_found",
            FidaError::Conflict(_) => "conflict",
            FidaError::PayloadTooLarge => "payload_too_large",
            FidaError::RateLimited => "rate_limited",
            FidaError::Validation(_) => "validation_error",
            FidaError::IntegrityViolation(_) => "internal_error",
            FidaError::Crypto(_) => "internal_error",
            FidaError::Timeout => "timeout",
            FidaError::Internal(_) => "internal_error",
        }
    }

    /// Whether the propagation policy (spec §7) exposes this error's
    /// detail to the caller, vs. logging it and returning a generic body.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            FidaError::AuthMissing
                | FidaError::AuthInvalid
                | FidaError::AuthzDenied
                | FidaError::NotFound
                | FidaError::Conflict(_)
                | FidaError::PayloadTooLarge
                | FidaError::RateLimited
                | FidaError::Validation(_)
                | FidaError::Timeout
        )
    }
}

impl From<fida_crypto::CryptoError> for FidaError {
    fn from(err: fida_crypto::CryptoError) -> Self {
        FidaError::Crypto(err.to_string())
    }
}

/// Deployment configuration, sourced from the environment variables named
/// in the external interfaces section of the specification.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the `redb` database file (the `DATABASE_URL` variable,
    /// repurposed from a SQL connection string — see DESIGN.md).
    pub database_path: String,
    /// Optional shared-cache endpoint for the rate limiter.
    pub redis_url: Option<String>,
    /// Base64url 32-byte AES-256-GCM master key.
    pub master_key_b64: String,
    /// One-shot bootstrap shared secret.
    pub bootstrap_token: String,
    /// Token-bucket burst size per API key, per second.
    pub rate_limit_burst: u32,
    /// Number of events per checkpoint batch.
    pub checkpoint_batch: u64,
    /// Maximum accepted request body size, in bytes.
    pub max_body_bytes: usize,
    /// Allowed CORS origins.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from the process environment, applying the
    /// documented defaults for optional values.
    pub fn from_env() -> Result<Self, FidaError> {
        let database_path = std::env::var("DATABASE_URL")
            .map_err(|_| FidaError::Config("DATABASE_URL is required".into()))?;
        let master_key_b64 = std::env::var("FIDA_MASTER_KEY_B64")
            .map_err(|_| FidaError::Config("FIDA_MASTER_KEY_B64 is required".into()))?;
        let decoded = fida_crypto::b64u_decode(&master_key_b64)
            .map_err(|e| FidaError::Config(format!("FIDA_MASTER_KEY_B64 invalid: {e}")))?;
        if decoded.len() != 32 {
            return Err(FidaError::Config(format!(
                "FIDA_MASTER_KEY_B64 must decode to 32 bytes, got {}",
                decoded.len()
            )));
        }
        let bootstrap_token = std::env::var("FIDA_BOOTSTRAP_TOKEN")
            .map_err(|_| FidaError::Config("FIDA_BOOTSTRAP_TOKEN is required".into()))?;
        let rate_limit_burst = env_u32("FIDA_RATE_LIMIT_BURST", 40)?;
        let checkpoint_batch = env_u64("FIDA_CHECKPOINT_BATCH", 5000)?;
        let max_body_bytes = env_u32("FIDA_MAX_BODY_BYTES", 200_000)? as usize;
        let allowed_origins = std::env::var("FIDA_ALLOWED_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
            .unwrap_or_default();
        let redis_url = std::env::var("REDIS_URL").ok();

        Ok(Self {
            database_path,
            redis_url,
            master_key_b64,
            bootstrap_token,
            rate_limit_burst,
            checkpoint_batch,
            max_body_bytes,
            allowed_origins,
        })
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32, FidaError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| FidaError::Config(format!("{name} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, FidaError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| FidaError::Config(format!("{name} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_wire_strings() {
        for role in [Role::Admin, Role::Issuer, Role::Verifier, Role::Exporter] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("bogus"), None);
    }

    #[test]
    fn reason_code_missing_renders_field_list() {
        let rc = ReasonCode::Missing("tenant_id,seq".to_string());
        assert_eq!(rc.as_wire(), "missing:tenant_id,seq");
    }

    #[test]
    fn error_status_codes_match_taxonomy() {
        assert_eq!(FidaError::AuthMissing.status_code(), 401);
        assert_eq!(FidaError::AuthzDenied.status_code(), 403);
        assert_eq!(FidaError::NotFound.status_code(), 404);
        assert_eq!(FidaError::Conflict("x".into()).status_code(), 409);
        assert_eq!(FidaError::PayloadTooLarge.status_code(), 413);
        assert_eq!(FidaError::RateLimited.status_code(), 429);
        assert_eq!(FidaError::Timeout.status_code(), 503);
    }

    #[test]
    fn internal_errors_are_not_user_visible() {
        assert!(!FidaError::Internal("boom".into()).is_user_visible());
        assert!(!FidaError::Crypto("boom".into()).is_user_visible());
        assert!(FidaError::Validation("bad field".into()).is_user_visible());
    }
}
