//! API-key authentication and role/tenant authorization.
//!
//! Presented credentials take the wire form `"<key_id>.<secret>"`. Only
//! `sha256_hex(secret)` is ever compared against the stored `key_hash`; the
//! raw secret is never persisted (it is returned to the caller exactly once,
//! at mint time).

use fida_crypto::sha256_hex;
use fida_spec::{FidaError, Role};
use fida_store::Store;

/// An authenticated principal: the resolved key, its role, and its tenant
/// scope (`None` for platform admin keys).
#[derive(Debug, Clone)]
pub struct Principal {
    /// The key id presented.
    pub key_id: String,
    /// Granted role.
    pub role: Role,
    /// Tenant this principal is scoped to, if any.
    pub tenant_id: Option<String>,
}

/// Split `"<key_id>.<secret>"`, the wire form of a presented API key.
fn split_presented_key(presented: &str) -> Result<(&str, &str), FidaError> {
    presented
        .split_once('.')
        .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
        .ok_or(FidaError::AuthInvalid)
}

/// Resolve the `x-api-key` header value into an authenticated principal.
pub fn authenticate(store: &Store, presented: &str) -> Result<Principal, FidaError> {
    let (key_id, secret) = split_presented_key(presented)?;
    let record = store
        .get_api_key(key_id)
        .map_err(|e| FidaError::Internal(e.to_string()))?
        .ok_or(FidaError::AuthInvalid)?;
    if record.revoked {
        return Err(FidaError::AuthInvalid);
    }
    if sha256_hex(secret.as_bytes()) != record.secret_hash {
        return Err(FidaError::AuthInvalid);
    }
    let role = Role::parse(&record.role).ok_or(FidaError::AuthInvalid)?;
    Ok(Principal {
        key_id: record.key_id,
        role,
        tenant_id: record.tenant_id,
    })
}

/// Verify a bootstrap request's `x-bootstrap-token` against the configured
/// secret, constant-time via digest comparison.
pub fn authenticate_bootstrap(configured_token: &str, presented: &str) -> Result<(), FidaError> {
    if sha256_hex(presented.as_bytes()) == sha256_hex(configured_token.as_bytes()) {
        Ok(())
    } else {
        Err(FidaError::AuthInvalid)
    }
}

/// Require that `principal` holds one of `allowed` roles.
pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<(), FidaError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(FidaError::AuthzDenied)
    }
}

/// Require that a tenant-scoped principal's tenant matches the target
/// resource's tenant. Platform admins (`tenant_id = None`) always pass.
pub fn require_tenant_match(principal: &Principal, target_tenant_id: &str) -> Result<(), FidaError> {
    match &principal.tenant_id {
        Some(tid) if tid != target_tenant_id => Err(FidaError::AuthzDenied),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fida_store::ApiKeyRecord;
    use tempfile::tempdir;

    fn store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("ledger.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn authenticate_accepts_matching_secret() {
        let (store, _dir) = store();
        store
            .insert_api_key(&ApiKeyRecord {
                key_id: "key1".into(),
                secret_hash: sha256_hex(b"s3cret"),
                role: "issuer".into(),
                tenant_id: Some("acme".into()),
                revoked: false,
            })
            .unwrap();
        let principal = authenticate(&store, "key1.s3cret").unwrap();
        assert_eq!(principal.role, Role::Issuer);
        assert_eq!(principal.tenant_id.as_deref(), Some("acme"));
    }

    #[test]
    fn authenticate_rejects_wrong_secret() {
        let (store, _dir) = store();
        store
            .insert_api_key(&ApiKeyRecord {
                key_id: "key1".into(),
                secret_hash: sha256_hex(b"s3cret"),
                role: "issuer".into(),
                tenant_id: None,
                revoked: false,
            })
            .unwrap();
        assert!(authenticate(&store, "key1.wrong").is_err());
    }

    #[test]
    fn authenticate_rejects_revoked_key() {
        let (store, _dir) = store();
        store
            .insert_api_key(&ApiKeyRecord {
                key_id: "key1".into(),
                secret_hash: sha256_hex(b"s3cret"),
                role: "admin".into(),
                tenant_id: None,
                revoked: true,
            })
            .unwrap();
        assert!(authenticate(&store, "key1.s3cret").is_err());
    }

    #[test]
    fn tenant_mismatch_is_denied() {
        let principal = Principal {
            key_id: "k".into(),
            role: Role::Issuer,
            tenant_id: Some("acme".into()),
        };
        assert!(require_tenant_match(&principal, "other").is_err());
        assert!(require_tenant_match(&principal, "acme").is_ok());
    }

    #[test]
    fn admin_principal_without_tenant_matches_anything() {
        let principal = Principal {
            key_id: "k".into(),
            role: Role::Admin,
            tenant_id: None,
        };
        assert!(require_tenant_match(&principal, "whatever").is_ok());
    }
}
