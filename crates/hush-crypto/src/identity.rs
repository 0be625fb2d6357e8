//! Device identity keypair.
//!
//! One X25519 keypair per installation plus an opaque device identifier.
//! The private half is only reachable through [`DeviceKeyPair::diffie_hellman`]
//! and the storage encoding; it is zeroized when the keypair is dropped.

use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::hash::fingerprint;

/// Version byte of the secure-storage encoding.
pub const STORAGE_FORMAT_VERSION: u8 = 1;

/// Longest device id, in bytes. Must fit the one-byte length prefix.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Error type for identity operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("malformed stored identity: {0}")]
    MalformedStorage(&'static str),
    #[error("unsupported stored identity version {0}")]
    UnsupportedStorageVersion(u8),
    #[error("peer public key produced a non-contributory shared secret")]
    NonContributory,
    #[error("secure random source unavailable")]
    RandomnessUnavailable,
    #[error("device id must be 1..={max} bytes, got {got}")]
    InvalidDeviceId { max: usize, got: usize },
}

/// A device's long-term X25519 keypair and its device identifier.
pub struct DeviceKeyPair {
    secret: StaticSecret,
    public: [u8; 32],
    device_id: String,
}

impl DeviceKeyPair {
    /// Generate a fresh keypair and a random 128-bit device id.
    pub fn generate() -> Result<Self, IdentityError> {
        let mut id = [0u8; 16];
        getrandom::getrandom(&mut id).map_err(|_| IdentityError::RandomnessUnavailable)?;
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_secret(secret, hex::encode(id))
    }

    /// Generate a fresh keypair for an existing device id (key rotation).
    pub fn generate_for_device(device_id: impl Into<String>) -> Result<Self, IdentityError> {
        Self::from_secret(StaticSecret::random_from_rng(OsRng), device_id.into())
    }

    /// Rebuild a keypair from raw private key bytes.
    pub fn from_secret_bytes(secret: [u8; 32], device_id: impl Into<String>) -> Result<Self, IdentityError> {
        Self::from_secret(StaticSecret::from(secret), device_id.into())
    }

    fn from_secret(secret: StaticSecret, device_id: String) -> Result<Self, IdentityError> {
        if device_id.is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
            return Err(IdentityError::InvalidDeviceId {
                max: MAX_DEVICE_ID_LEN,
                got: device_id.len(),
            });
        }
        let public = X25519PublicKey::from(&secret).to_bytes();
        Ok(Self { secret, public, device_id })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Log-safe fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }

    /// X25519 with a peer public key. Rejects low-order peer points.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, IdentityError> {
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(IdentityError::NonContributory);
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }

    /// Encoding handed to the secure storage capability:
    /// `version || private_key(32) || id_len(1) || device_id`.
    pub fn to_storage_bytes(&self) -> Zeroizing<Vec<u8>> {
        let secret = Zeroizing::new(self.secret.to_bytes());
        // construction bounds the id to MAX_DEVICE_ID_LEN
        let id = self.device_id.as_bytes();
        let mut out = Zeroizing::new(Vec::with_capacity(2 + 32 + id.len()));
        out.push(STORAGE_FORMAT_VERSION);
        out.extend_from_slice(&secret[..]);
        out.push(u8::try_from(id.len()).unwrap_or(u8::MAX));
        out.extend_from_slice(id);
        out
    }

    pub fn from_storage_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let (&version, rest) = bytes
            .split_first()
            .ok_or(IdentityError::MalformedStorage("empty"))?;
        if version != STORAGE_FORMAT_VERSION {
            return Err(IdentityError::UnsupportedStorageVersion(version));
        }
        if rest.len() < 33 {
            return Err(IdentityError::MalformedStorage("truncated"));
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&rest[..32]);
        let id_len = rest[32] as usize;
        let id = &rest[33..];
        if id.len() != id_len || id_len == 0 {
            return Err(IdentityError::MalformedStorage("device id length"));
        }
        let device_id = std::str::from_utf8(id)
            .map_err(|_| IdentityError::MalformedStorage("device id not utf-8"))?;
        Self::from_secret(StaticSecret::from(*secret), device_id.to_string())
    }
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("device_id", &self.device_id)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Convert a slice into a 32-byte public key.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<[u8; 32], IdentityError> {
    bytes.try_into().map_err(|_| IdentityError::InvalidKeyLength {
        expected: 32,
        got: bytes.len(),
    })
}
