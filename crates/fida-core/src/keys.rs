//! Sealing and unsealing of tenant/platform Ed25519 signing seeds under the
//! deployment's AES-256-GCM master key.

use fida_crypto::{Envelope, SigningIdentity};
use fida_spec::FidaError;

/// A freshly minted signing identity, along with its at-rest encrypted form.
pub struct MintedIdentity {
    /// The live signing identity (held only for the duration of the mint).
    pub identity: SigningIdentity,
    /// Public key, base64url.
    pub public_key_b64u: String,
    /// Sealed 32-byte seed, ready to persist.
    pub sealed_seed_b64u: String,
}

/// Wraps the master-key envelope used to protect tenant and platform seeds.
pub struct KeyVault {
    envelope: Envelope,
}

impl KeyVault {
    /// Build a vault from the deployment's base64url master key.
    pub fn new(master_key_b64u: &str) -> Result<Self, FidaError> {
        let envelope = Envelope::from_b64u(master_key_b64u)
            .map_err(|e| FidaError::Config(format!("invalid FIDA_MASTER_KEY_B64: {e}")))?;
        Ok(Self { envelope })
    }

    /// Generate a new random Ed25519 identity and seal its seed.
    pub fn mint(&self) -> Result<MintedIdentity, FidaError> {
        let identity = SigningIdentity::generate();
        let public_key_b64u = identity.public_b64u();
        let sealed_seed_b64u = self.envelope.seal(&identity.seed_bytes())?;
        Ok(MintedIdentity {
            identity,
            public_key_b64u,
            sealed_seed_b64u,
        })
    }

    /// Unseal a previously sealed seed back into a usable signing identity.
    pub fn open(&self, sealed_seed_b64u: &str) -> Result<SigningIdentity, FidaError> {
        let seed_bytes = self.envelope.open(sealed_seed_b64u)?;
        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| FidaError::Crypto("sealed seed had unexpected length".into()))?;
        Ok(SigningIdentity::from_seed(&seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fida_crypto::b64u;

    fn vault() -> KeyVault {
        KeyVault::new(&b64u(&[3u8; 32])).unwrap()
    }

    #[test]
    fn mint_then_open_recovers_same_public_key() {
        let vault = vault();
        let minted = vault.mint().unwrap();
        let reopened = vault.open(&minted.sealed_seed_b64u).unwrap();
        assert_eq!(reopened.public_b64u(), minted.public_key_b64u);
    }

    #[test]
    fn rejects_bad_master_key() {
        assert!(KeyVault::new("not-base64url-32-bytes!!").is_err());
    }
}
