//! Platform bootstrap, tenant provisioning, and API key minting.
//!
//! These are one-shot or low-frequency administrative operations, not on
//! the hot path, so they take the full `Store`/`KeyVault` directly rather
//! than going through [`crate::LedgerEngine`]'s locking.

use fida_crypto::sha256_hex;
use fida_spec::{FidaError, Role};
use fida_store::{ApiKeyRecord, PlatformState, Store, TenantRecord};
use rand_core::RngCore;

use crate::keys::KeyVault;

fn random_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// An API key's one-time plaintext form, returned only at mint time.
pub struct MintedApiKey {
    /// Public key id, used as the lookup half of `x-api-key`.
    pub key_id: String,
    /// The full presented-credential string: `"<key_id>.<secret>"`.
    pub presented: String,
}

fn mint_api_key(store: &Store, role: Role, tenant_id: Option<String>) -> Result<MintedApiKey, FidaError> {
    let key_id = format!("fk_{}", random_token(8));
    let secret = random_token(24);
    store
        .insert_api_key(&ApiKeyRecord {
            key_id: key_id.clone(),
            secret_hash: sha256_hex(secret.as_bytes()),
            role: role.as_str().to_string(),
            tenant_id,
            revoked: false,
        })
        .map_err(|e| FidaError::IntegrityViolation(e.to_string()))?;
    Ok(MintedApiKey {
        presented: format!("{key_id}.{secret}"),
        key_id,
    })
}

/// Run the one-shot platform bootstrap: mint the platform signing identity
/// and a first platform admin API key. Fails with `Conflict` if bootstrap
/// has already run.
pub fn bootstrap(store: &Store, vault: &KeyVault) -> Result<MintedApiKey, FidaError> {
    if store
        .get_platform_state()
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .is_some()
    {
        return Err(FidaError::Conflict("platform already bootstrapped".into()));
    }
    let minted = vault.mint()?;
    let kid = "platform-key-1".to_string();
    store
        .put_platform_state(&PlatformState {
            locked: false,
            kid,
            public_key_b64u: minted.public_key_b64u,
            sealed_seed_b64u: minted.sealed_seed_b64u,
        })
        .map_err(|e| FidaError::Internal(e.to_string()))?;
    mint_api_key(store, Role::Admin, None)
}

/// Freeze the platform bootstrap state so the platform key can never be
/// re-minted. Idempotent-safe: calling it twice on an already-locked state
/// is a conflict, not a crash.
pub fn lock_bootstrap(store: &Store) -> Result<(), FidaError> {
    let mut state = store
        .get_platform_state()
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .ok_or_else(|| FidaError::Conflict("platform has not been bootstrapped".into()))?;
    if state.locked {
        return Err(FidaError::Conflict("bootstrap is already locked".into()));
    }
    state.locked = true;
    store
        .put_platform_state(&state)
        .map_err(|e| FidaError::Internal(e.to_string()))
}

/// Register a new tenant with a freshly minted signing identity.
pub fn create_tenant(store: &Store, vault: &KeyVault, tenant_id: &str) -> Result<TenantRecord, FidaError> {
    if tenant_id.is_empty() || tenant_id.len() > 80 {
        return Err(FidaError::Validation("tenant_id must be 1-80 characters".into()));
    }
    let minted = vault.mint()?;
    let tenant = TenantRecord {
        tenant_id: tenant_id.to_string(),
        kid: format!("{tenant_id}-key-1"),
        public_key_b64u: minted.public_key_b64u,
        sealed_seed_b64u: minted.sealed_seed_b64u,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    store
        .insert_tenant(&tenant)
        .map_err(|e| match e {
            fida_store::StoreError::Integrity(msg) => FidaError::Conflict(msg),
            other => FidaError::Internal(other.to_string()),
        })?;
    Ok(tenant)
}

/// Mint a new scoped API key for `tenant_id` (or platform-wide if `None`).
pub fn issue_api_key(
    store: &Store,
    role: Role,
    tenant_id: Option<String>,
) -> Result<MintedApiKey, FidaError> {
    if let Some(tid) = &tenant_id {
        store
            .get_tenant(tid)
            .map_err(|e| FidaError::Internal(e.to_string()))?
            .ok_or(FidaError::NotFound)?;
    }
    mint_api_key(store, role, tenant_id)
}
