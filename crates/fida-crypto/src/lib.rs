//! Hashing, Ed25519 signing, base64url encoding, and the at-rest AEAD
//! envelope used to store tenant and platform signing seeds.
#![deny(missing_docs)]

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

/// The fixed label this workspace advertises for its digest algorithm.
pub const HASH_ALG: &str = "SHA-256";

/// Errors raised by the crypto primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The at-rest master key was not exactly 32 bytes.
    #[error("master key must be exactly 32 bytes, got {0}")]
    BadMasterKeyLen(usize),
    /// AEAD authentication failed while sealing or opening an envelope.
    #[error("AEAD operation failed")]
    Aead,
    /// A base64url blob did not decode.
    #[error("invalid base64url encoding: {0}")]
    BadBase64(#[from] base64::DecodeError),
    /// A byte slice was not the size a key or signature requires.
    #[error("invalid length for {what}: expected {expected}, got {got}")]
    BadLength {
        /// Name of the field being decoded.
        what: &'static str,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },
    /// A public key or signature was malformed.
    #[error("malformed key material")]
    Malformed,
    /// Signature verification failed.
    #[error("signature verification failed")]
    VerifyFailed,
}

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// SHA-256 of `bytes`, rendered as 64 lowercase hex characters.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// SHA-256 of `bytes`, as a raw 32-byte digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Decode a 64-char lowercase hex digest into raw bytes.
pub fn hex_decode_32(s: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = hex::decode(s).map_err(|_| CryptoError::Malformed)?;
    bytes.try_into().map_err(|v: Vec<u8>| CryptoError::BadLength {
        what: "hash",
        expected: 32,
        got: v.len(),
    })
}

/// URL-safe base64 encode without padding.
pub fn b64u(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// URL-safe base64 decode, tolerant of missing or present padding.
pub fn b64u_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = s.trim_end_matches('=');
    B64.decode(trimmed).map_err(CryptoError::BadBase64)
}

/// An Ed25519 keypair used for tenant or platform event signing.
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand_core::OsRng),
        }
    }

    /// Load an identity from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The raw 32-byte seed backing this identity, for at-rest storage.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public key, base64url-encoded.
    pub fn public_b64u(&self) -> String {
        b64u(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign a raw digest (the ledger protocol signs the 32-byte event hash,
    /// not the header bytes it was derived from — see the ledger engine).
    pub fn sign_digest(&self, digest: &[u8; 32]) -> String {
        let sig = self.signing_key.sign(digest);
        b64u(&sig.to_bytes())
    }

    /// Sign arbitrary bytes (the checkpoint protocol signs the canonical
    /// header bytes directly, a different discipline from event signing).
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        let sig = self.signing_key.sign(bytes);
        b64u(&sig.to_bytes())
    }
}

/// Verify a base64url Ed25519 signature over `message` with the given
/// base64url public key.
pub fn verify(pub_b64u: &str, message: &[u8], signature_b64u: &str) -> Result<bool, CryptoError> {
    let pub_bytes = b64u_decode(pub_b64u)?;
    let pub_len = pub_bytes.len();
    let pub_bytes: [u8; 32] = pub_bytes
        .try_into()
        .map_err(|_| CryptoError::BadLength { what: "public key", expected: 32, got: pub_len })?;
    let verifying_key = VerifyingKey::from_bytes(&pub_bytes).map_err(|_| CryptoError::Malformed)?;

    let sig_bytes = b64u_decode(signature_b64u)?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::BadLength { what: "signature", expected: 64, got: v.len() })?;
    let signature = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// At-rest AEAD envelope: AES-256-GCM with a single deployment-wide master
/// key. Ciphertext layout is `nonce(12) || ciphertext || tag`, the whole
/// blob base64url-encoded. Associated data is empty; callers that need to
/// bind the envelope to a record identity should fold it into the
/// plaintext instead.
///
/// Implemented as a pluggable operation (this struct, constructed from a
/// raw key) so a KMS-backed implementation can replace the static master
/// key without touching call sites that only see `seal`/`open`.
pub struct Envelope {
    key: [u8; 32],
}

impl Drop for Envelope {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Envelope {
    /// Construct an envelope from a 32-byte master key.
    pub fn new(master_key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; 32] = master_key
            .try_into()
            .map_err(|_| CryptoError::BadMasterKeyLen(master_key.len()))?;
        Ok(Self { key })
    }

    /// Construct an envelope from a base64url-encoded 32-byte master key.
    pub fn from_b64u(master_key_b64u: &str) -> Result<Self, CryptoError> {
        let key = b64u_decode(master_key_b64u)?;
        Self::new(&key)
    }

    /// Seal plaintext, returning a single base64url blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Aead)?;
        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(b64u(&out))
    }

    /// Open a sealed blob, returning the plaintext.
    pub fn open(&self, sealed_b64u: &str) -> Result<Vec<u8>, CryptoError> {
        let blob = b64u_decode(sealed_b64u)?;
        if blob.len() < 12 {
            return Err(CryptoError::Malformed);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(12);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Aead)
    }
}
