//! Sealed-box encryption for message payloads.
//!
//! Every seal generates a fresh ephemeral X25519 keypair, derives a one-shot
//! key with HKDF-SHA256 and encrypts with XChaCha20-Poly1305 under a random
//! 24-byte nonce. The ephemeral secret is dropped before `seal` returns.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroizing;

use crate::identity::{DeviceKeyPair, IdentityError};
use crate::transcript::{tags, Transcript};

/// Wire value of the scheme implemented here.
pub const SCHEME_VERSION: u32 = 2;
pub const NONCE_LEN: usize = 24;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("invalid key bytes")]
    InvalidKeyBytes,
    #[error("secure random source unavailable")]
    RandomnessUnavailable,
    #[error("encryption failed")]
    EncryptFailed,
    /// MAC did not verify: tampering, corruption, or the wrong private key.
    #[error("authentication failed")]
    AuthenticationFailed,
}

impl From<IdentityError> for EnvelopeError {
    fn from(_: IdentityError) -> Self {
        EnvelopeError::InvalidKeyBytes
    }
}

/// Output of [`seal`]: the envelope minus its tracking fields.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub ephemeral_public_key: [u8; 32],
    pub scheme_version: u32,
}

impl std::fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("scheme_version", &self.scheme_version)
            .finish_non_exhaustive()
    }
}

/// AEAD associated data; binds the ciphertext to the scheme, the ephemeral key
/// and the intended recipient key.
pub fn envelope_aad_v2(ephemeral_public_key: &[u8; 32], recipient_public_key: &[u8; 32]) -> Vec<u8> {
    let mut t = Transcript::new("hush_env_aad_v2");
    t.append_u64(tags::SCHEME, SCHEME_VERSION as u64);
    t.append_bytes(tags::KEY, ephemeral_public_key);
    t.append_bytes(tags::PEER_KEY, recipient_public_key);
    t.as_bytes().to_vec()
}

fn kdf_key(shared_secret: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> Result<Zeroizing<[u8; 32]>, EnvelopeError> {
    // HKDF-SHA256(salt = nonce, ikm = shared_secret)
    let hk = Hkdf::<Sha256>::new(Some(nonce), shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(b"hush_env_v2_key", &mut key[..])
        .map_err(|_| EnvelopeError::EncryptFailed)?;
    Ok(key)
}

/// Seal `plaintext` to `recipient_public_key`.
pub fn seal(plaintext: &[u8], recipient_public_key: &[u8; 32]) -> Result<SealedPayload, EnvelopeError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|_| EnvelopeError::RandomnessUnavailable)?;

    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph).to_bytes();

    // Consumes the ephemeral secret.
    let shared = eph.diffie_hellman(&X25519PublicKey::from(*recipient_public_key));
    if !shared.was_contributory() {
        return Err(EnvelopeError::InvalidKeyBytes);
    }
    let shared_bytes = Zeroizing::new(shared.to_bytes());

    let key = kdf_key(&shared_bytes, &nonce)?;
    let aad = envelope_aad_v2(&eph_pub, recipient_public_key);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad: &aad })
        .map_err(|_| EnvelopeError::EncryptFailed)?;

    Ok(SealedPayload {
        ciphertext,
        nonce,
        ephemeral_public_key: eph_pub,
        scheme_version: SCHEME_VERSION,
    })
}

/// Open a sealed payload with the recipient's device keypair.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    ephemeral_public_key: &[u8; 32],
    recipient: &DeviceKeyPair,
) -> Result<Vec<u8>, EnvelopeError> {
    let shared = recipient
        .diffie_hellman(ephemeral_public_key)
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;
    let key = kdf_key(&shared, nonce).map_err(|_| EnvelopeError::AuthenticationFailed)?;
    let aad = envelope_aad_v2(ephemeral_public_key, recipient.public_key());

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: &aad })
        .map_err(|_| EnvelopeError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let recipient = DeviceKeyPair::generate().unwrap();
        let plaintext = b"Hello, secure world!";

        let sealed = seal(plaintext, recipient.public_key()).unwrap();
        assert_eq!(sealed.scheme_version, SCHEME_VERSION);
        assert_eq!(sealed.ciphertext.len(), plaintext.len() + 16);

        let opened = open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &recipient).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let recipient = DeviceKeyPair::generate().unwrap();
        let sealed = seal(b"", recipient.public_key()).unwrap();
        let opened = open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &recipient).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = DeviceKeyPair::generate().unwrap();
        let other = DeviceKeyPair::generate().unwrap();
        let sealed = seal(b"for recipient only", recipient.public_key()).unwrap();
        assert_eq!(
            open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &other),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let recipient = DeviceKeyPair::generate().unwrap();
        let sealed = seal(b"payload", recipient.public_key()).unwrap();
        let mut nonce = sealed.nonce;
        nonce[0] ^= 1;
        assert_eq!(
            open(&sealed.ciphertext, &nonce, &sealed.ephemeral_public_key, &recipient),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_substituted_ephemeral_key_fails() {
        let recipient = DeviceKeyPair::generate().unwrap();
        let sealed = seal(b"payload", recipient.public_key()).unwrap();
        let attacker = DeviceKeyPair::generate().unwrap();
        assert_eq!(
            open(&sealed.ciphertext, &sealed.nonce, attacker.public_key(), &recipient),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        assert_eq!(seal(b"x", &[0u8; 32]), Err(EnvelopeError::InvalidKeyBytes));
    }
}
