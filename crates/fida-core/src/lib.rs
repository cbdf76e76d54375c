//! Ledger engines: issuance, checkpointing, verification, Merkle proofs,
//! key management, API-key authentication, and rate limiting.
//!
//! [`LedgerEngine`] is the facade `fida-server` drives: it owns the
//! per-tenant locking discipline the specification requires (sequence
//! allocation and checkpoint-advisory locks are independent, so two
//! tenants never contend and a checkpoint cut never blocks an issuer)
//! while delegating the actual algorithms to the `engines` module.
#![deny(missing_docs)]

use std::sync::Arc;

use dashmap::DashMap;
use fida_spec::{Checkpoint, FidaError, ReceiptInput, VerifyResult};
use fida_store::{Store, TenantRecord};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Platform bootstrap, tenant provisioning, and API key minting.
pub mod admin;
/// API-key authentication and role/tenant authorization.
pub mod auth;
/// The four core algorithms: issue, checkpoint, verify, proof.
pub mod engines;
/// Canonical event/checkpoint header hashing, shared by issue and verify.
pub mod header;
/// At-rest sealing/unsealing of tenant and platform signing seeds.
pub mod keys;
/// Token-bucket rate limiting keyed by API key id.
pub mod ratelimit;

pub use engines::issue::{IssueOutcome, IssueRequest};

/// Ties the storage layer, key vault, and per-tenant locking together into
/// the operations `fida-server`'s handlers call directly.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Store,
    vault: Arc<keys::KeyVault>,
    checkpoint_batch: u64,
    seq_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    checkpoint_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LedgerEngine {
    /// Build the engine facade over an opened store and master-key vault.
    pub fn new(store: Store, vault: keys::KeyVault, checkpoint_batch: u64) -> Self {
        Self {
            store,
            vault: Arc::new(vault),
            checkpoint_batch,
            seq_locks: Arc::new(DashMap::new()),
            checkpoint_locks: Arc::new(DashMap::new()),
        }
    }

    /// The underlying store, for handlers that need direct read access
    /// (export listing, tenant/key lookups).
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn lock_for(map: &DashMap<String, Arc<Mutex<()>>>, tenant_id: &str) -> Arc<Mutex<()>> {
        map.entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Issue a new event for `tenant_id`, serialized against other issuers
    /// for the same tenant only, then opportunistically cut a checkpoint.
    pub async fn issue(
        &self,
        tenant: &TenantRecord,
        request: IssueRequest,
    ) -> Result<IssueOutcome, FidaError> {
        let lock = Self::lock_for(&self.seq_locks, &tenant.tenant_id);
        let mut outcome = {
            let _guard = lock.lock().await;
            engines::issue::issue_event(&self.store, &self.vault, tenant, request)?
        };

        if !outcome.idem_hit {
            outcome.checkpoint_cut = self.try_checkpoint(tenant).await;
        }
        Ok(outcome)
    }

    /// Opportunistically cut a checkpoint for `tenant` if a full batch has
    /// accumulated. Skips (rather than waiting) if another writer already
    /// holds the tenant's checkpoint lock, per the concurrency model.
    async fn try_checkpoint(&self, tenant: &TenantRecord) -> Option<Checkpoint> {
        let lock = Self::lock_for(&self.checkpoint_locks, &tenant.tenant_id);
        let Ok(_guard) = lock.try_lock() else {
            return None;
        };
        let platform_state = match self.store.get_platform_state() {
            Ok(Some(state)) => state,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to load platform state for checkpoint attempt");
                return None;
            }
        };
        match engines::checkpoint::maybe_checkpoint(
            &self.store,
            &self.vault,
            &platform_state.kid,
            &platform_state.sealed_seed_b64u,
            tenant,
            self.checkpoint_batch,
        ) {
            Ok(Some(checkpoint)) => {
                info!(
                    tenant_id = %tenant.tenant_id,
                    checkpoint_id = checkpoint.id,
                    from_seq = checkpoint.header.from_seq,
                    to_seq = checkpoint.header.to_seq,
                    "cut checkpoint"
                );
                Some(checkpoint)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(tenant_id = %tenant.tenant_id, error = %e, "checkpoint attempt failed");
                None
            }
        }
    }

    /// Explicitly force a checkpoint attempt for `tenant`, bypassing the
    /// opportunistic trigger. Used by a background sweep and by tests.
    pub async fn checkpoint_now(&self, tenant: &TenantRecord) -> Result<Option<Checkpoint>, FidaError> {
        let lock = Self::lock_for(&self.checkpoint_locks, &tenant.tenant_id);
        let _guard = lock.lock().await;
        let platform_state = self
            .store
            .get_platform_state()
            .map_err(|e| FidaError::Internal(e.to_string()))?
            .ok_or_else(|| FidaError::Conflict("platform has not been bootstrapped".into()))?;
        engines::checkpoint::maybe_checkpoint(
            &self.store,
            &self.vault,
            &platform_state.kid,
            &platform_state.sealed_seed_b64u,
            tenant,
            self.checkpoint_batch,
        )
    }

    /// Run the one-shot platform bootstrap.
    pub fn bootstrap(&self) -> Result<admin::MintedApiKey, FidaError> {
        admin::bootstrap(&self.store, &self.vault)
    }

    /// Freeze the platform bootstrap state.
    pub fn lock_bootstrap(&self) -> Result<(), FidaError> {
        admin::lock_bootstrap(&self.store)
    }

    /// Register a new tenant.
    pub fn create_tenant(&self, tenant_id: &str) -> Result<TenantRecord, FidaError> {
        admin::create_tenant(&self.store, &self.vault, tenant_id)
    }

    /// Mint a new scoped API key.
    pub fn issue_api_key(
        &self,
        role: fida_spec::Role,
        tenant_id: Option<String>,
    ) -> Result<admin::MintedApiKey, FidaError> {
        admin::issue_api_key(&self.store, role, tenant_id)
    }

    /// Fetch a tenant by id, for handlers that need the record directly.
    pub fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>, FidaError> {
        self.store
            .get_tenant(tenant_id)
            .map_err(|e| FidaError::Internal(e.to_string()))
    }

    /// Verify a receipt against `tenant`'s current public key. `input`
    /// fields are all optional so a caller's malformed body is reported as
    /// a structured `missing:<csv>` result rather than rejected upfront.
    pub fn verify(&self, tenant: &TenantRecord, input: &ReceiptInput) -> Result<VerifyResult, FidaError> {
        engines::verify::verify_receipt(&self.store, tenant, input)
    }

    /// Build the Merkle inclusion proof for `event_id` under `tenant_id`.
    pub fn proof(&self, tenant_id: &str, event_id: &str) -> Result<fida_merkle::Proof, FidaError> {
        engines::proof::build_proof(&self.store, tenant_id, event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fida_crypto::b64u;
    use fida_spec::Receipt;
    use serde_json::json;
    use tempfile::tempdir;

    fn engine() -> (LedgerEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("ledger.redb")).unwrap();
        let vault = keys::KeyVault::new(&b64u(&[1u8; 32])).unwrap();
        admin::bootstrap(&store, &vault).unwrap();
        (LedgerEngine::new(store, vault, 3), dir)
    }

    fn issue_request() -> IssueRequest {
        IssueRequest {
            payload: json!({"a": 1}),
            profile_id: "HUMAN-MSP-01".into(),
            event_type: "CHANGE".into(),
            actor_role: "agent".into(),
            object_ref: "".into(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn issue_then_verify_round_trips() {
        let (engine, _dir) = engine();
        let vault = keys::KeyVault::new(&b64u(&[1u8; 32])).unwrap();
        let tenant = admin::create_tenant(engine.store(), &vault, "acme").unwrap();

        let outcome = engine.issue(&tenant, issue_request()).await.unwrap();
        assert_eq!(outcome.header.seq, 1);
        assert!(outcome.header.prev_event_hash.is_none());
        assert_eq!(outcome.event_hash.len(), 64);

        let receipt = Receipt {
            header: outcome.header,
            event_hash: outcome.event_hash,
            signature_b64u: outcome.signature_b64u,
        };
        let result = engine.verify(&tenant, &receipt.into()).unwrap();
        assert!(result.valid);
        assert!(result.signature_valid);
        assert!(result.hash_valid);
    }

    #[tokio::test]
    async fn idempotent_reissue_returns_same_event() {
        let (engine, _dir) = engine();
        let vault = keys::KeyVault::new(&b64u(&[1u8; 32])).unwrap();
        let tenant = admin::create_tenant(engine.store(), &vault, "acme").unwrap();

        let mut request = issue_request();
        request.idempotency_key = Some("req-1".into());
        let first = engine.issue(&tenant, request).await.unwrap();
        assert!(!first.idem_hit);

        let mut retry = issue_request();
        retry.idempotency_key = Some("req-1".into());
        let second = engine.issue(&tenant, retry).await.unwrap();
        assert!(second.idem_hit);
        assert_eq!(second.event_hash, first.event_hash);
    }

    #[tokio::test]
    async fn checkpoint_cuts_after_batch_fills() {
        let (engine, _dir) = engine();
        let vault = keys::KeyVault::new(&b64u(&[1u8; 32])).unwrap();
        let tenant = admin::create_tenant(engine.store(), &vault, "acme").unwrap();

        for _ in 0..3 {
            engine.issue(&tenant, issue_request()).await.unwrap();
        }

        let checkpoint = engine.checkpoint_now(&tenant).await.unwrap();
        assert!(checkpoint.is_none(), "already cut opportunistically after the 3rd issue");

        let proof = engine.proof(&tenant.tenant_id, "missing-event-id");
        assert!(matches!(proof, Err(FidaError::NotFound)));
    }
}
