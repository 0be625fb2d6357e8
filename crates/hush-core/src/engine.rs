//! Encryption engine.
//!
//! Stateless wrapper over the sealed-box primitives in `hush_crypto::envelope`
//! that speaks in wire envelopes and core errors. Every call generates a fresh
//! ephemeral key and nonce; the ephemeral secret is consumed by the key
//! agreement and never stored.

use tracing::{debug, warn};

use hush_crypto::envelope::{self, SealedPayload};
use hush_crypto::identity::DeviceKeyPair;
use hush_proto::v1::{EnvelopeV1, SchemeVersionV1};

use crate::errors::CoreError;

#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionEngine;

impl EncryptionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Seal `plaintext` to `recipient_public_key`.
    ///
    /// The sender's long-term key plays no part: confidentiality comes from
    /// the ephemeral exchange alone.
    pub fn encrypt(&self, plaintext: &[u8], recipient_public_key: &[u8; 32]) -> Result<SealedPayload, CoreError> {
        let sealed = envelope::seal(plaintext, recipient_public_key)?;
        debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = sealed.ciphertext.len(),
            "sealed payload"
        );
        Ok(sealed)
    }

    /// Open `envelope` with the recipient's key pair.
    ///
    /// Legacy and unknown schemes are refused with `UnsupportedScheme`; a MAC
    /// failure (tampering or the wrong key) is `AuthenticationFailed`.
    pub fn decrypt(&self, envelope: &EnvelopeV1, recipient: &DeviceKeyPair) -> Result<Vec<u8>, CoreError> {
        check_scheme(envelope.scheme_version)?;
        envelope.validate()?;
        let nonce = envelope.nonce_array()?;
        let ephemeral = envelope.ephemeral_public_key_array()?;

        let plaintext = envelope::open(&envelope.ciphertext, &nonce, &ephemeral, recipient)?;
        debug!(plaintext_len = plaintext.len(), "opened envelope");
        Ok(plaintext)
    }
}

/// Accept only the current scheme.
pub fn check_scheme(scheme_version: u32) -> Result<(), CoreError> {
    match SchemeVersionV1::from_wire(scheme_version) {
        Some(SchemeVersionV1::X25519HkdfXchacha20poly1305) => Ok(()),
        Some(SchemeVersionV1::LegacyUnauthenticated) => {
            warn!(
                target: "hush::security",
                scheme_version,
                "refusing legacy unauthenticated envelope"
            );
            Err(CoreError::UnsupportedScheme(scheme_version))
        }
        _ => Err(CoreError::UnsupportedScheme(scheme_version)),
    }
}

/// Wire envelope for `sealed`, stamped with the recipient's key tracking fields.
pub fn to_envelope(
    sealed: SealedPayload,
    recipient_key_id: Option<String>,
    recipient_device_id: Option<String>,
) -> EnvelopeV1 {
    EnvelopeV1 {
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce.to_vec(),
        ephemeral_public_key: sealed.ephemeral_public_key.to_vec(),
        recipient_key_id,
        recipient_device_id,
        scheme_version: sealed.scheme_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_envelope(plaintext: &[u8], recipient: &DeviceKeyPair) -> EnvelopeV1 {
        let sealed = EncryptionEngine.encrypt(plaintext, recipient.public_key()).unwrap();
        to_envelope(sealed, None, None)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let bob = DeviceKeyPair::generate().unwrap();
        let env = sealed_envelope(b"hello", &bob);
        assert_eq!(env.scheme_version, SchemeVersionV1::CURRENT.to_wire());
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap(), b"hello");
    }

    #[test]
    fn test_fresh_nonce_and_ephemeral_per_message() {
        let bob = DeviceKeyPair::generate().unwrap();
        let a = sealed_envelope(b"same", &bob);
        let b = sealed_envelope(b"same", &bob);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_authentication_failed() {
        let bob = DeviceKeyPair::generate().unwrap();
        let eve = DeviceKeyPair::generate().unwrap();
        let env = sealed_envelope(b"hello", &bob);
        assert_eq!(EncryptionEngine.decrypt(&env, &eve).unwrap_err(), CoreError::AuthenticationFailed);
    }

    #[test]
    fn test_tampered_ciphertext_is_authentication_failed() {
        let bob = DeviceKeyPair::generate().unwrap();
        let mut env = sealed_envelope(b"hello", &bob);
        env.ciphertext[0] ^= 0x01;
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap_err(), CoreError::AuthenticationFailed);
    }

    #[test]
    fn test_tampered_ephemeral_key_is_authentication_failed() {
        let bob = DeviceKeyPair::generate().unwrap();
        let mut env = sealed_envelope(b"hello", &bob);
        env.ephemeral_public_key = DeviceKeyPair::generate().unwrap().public_key().to_vec();
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap_err(), CoreError::AuthenticationFailed);
    }

    #[test]
    fn test_legacy_scheme_refused() {
        let bob = DeviceKeyPair::generate().unwrap();
        let mut env = sealed_envelope(b"hello", &bob);
        env.scheme_version = SchemeVersionV1::LegacyUnauthenticated.to_wire();
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap_err(), CoreError::UnsupportedScheme(1));
    }

    #[test]
    fn test_unknown_scheme_refused() {
        let bob = DeviceKeyPair::generate().unwrap();
        let mut env = sealed_envelope(b"hello", &bob);
        env.scheme_version = 99;
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap_err(), CoreError::UnsupportedScheme(99));
        env.scheme_version = 0;
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap_err(), CoreError::UnsupportedScheme(0));
    }

    #[test]
    fn test_truncated_nonce_is_invalid_envelope() {
        let bob = DeviceKeyPair::generate().unwrap();
        let mut env = sealed_envelope(b"hello", &bob);
        env.nonce.truncate(12);
        assert!(matches!(
            EncryptionEngine.decrypt(&env, &bob).unwrap_err(),
            CoreError::InvalidEnvelope(_)
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let bob = DeviceKeyPair::generate().unwrap();
        let env = sealed_envelope(b"", &bob);
        assert_eq!(EncryptionEngine.decrypt(&env, &bob).unwrap(), b"");
    }
}
