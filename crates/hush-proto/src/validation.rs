//! Structural validation for hush protocol messages.
//!
//! Only shapes are checked here (sizes, required fields, enum ranges).
//! Cryptographic checks belong to hush-crypto.

use crate::v1::*;

/// Validation error types for protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field has invalid size (expected, actual)
    InvalidSize { field: &'static str, expected: usize, actual: usize },
    /// Field size is out of allowed range
    SizeOutOfRange { field: &'static str, min: usize, max: usize, actual: usize },
    /// Required field is empty
    EmptyField { field: &'static str },
    /// Field contains invalid data
    InvalidData { field: &'static str, reason: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize { field, expected, actual } => {
                write!(f, "field '{}' has invalid size: expected {}, got {}", field, expected, actual)
            }
            Self::SizeOutOfRange { field, min, max, actual } => {
                write!(f, "field '{}' size {} is out of range [{}, {}]", field, actual, min, max)
            }
            Self::EmptyField { field } => {
                write!(f, "required field '{}' is empty", field)
            }
            Self::InvalidData { field, reason } => {
                write!(f, "field '{}' contains invalid data: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Constants for field sizes.
pub mod sizes {
    /// Size of X25519 public keys.
    pub const X25519_PUB_SIZE: usize = 32;
    /// Size of XChaCha20-Poly1305 nonces.
    pub const NONCE_SIZE: usize = 24;
    /// Size of the Poly1305 tag appended to every ciphertext.
    pub const TAG_SIZE: usize = 16;
    /// Upper bound for user and device identifiers.
    pub const MAX_ID_LEN: usize = 128;
    /// Upper bound for key identifiers.
    pub const MAX_KEY_ID_LEN: usize = 64;
    /// Upper bound for MIME types.
    pub const MAX_MIME_LEN: usize = 127;
}

fn check_id(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if value.len() > max {
        return Err(ValidationError::SizeOutOfRange { field, min: 1, max, actual: value.len() });
    }
    if !value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.') {
        return Err(ValidationError::InvalidData { field, reason: "must be [A-Za-z0-9._-]" });
    }
    // "." and ".." are path segments, not names
    if value.bytes().all(|b| b == b'.') {
        return Err(ValidationError::InvalidData { field, reason: "must not be only dots" });
    }
    Ok(())
}

/// Validate a user or device identifier used in relay paths.
pub fn validate_identifier(field: &'static str, value: &str) -> ValidationResult<()> {
    check_id(field, value, sizes::MAX_ID_LEN)
}

impl PublishKeyRequestV1 {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.public_key.len() != sizes::X25519_PUB_SIZE {
            return Err(ValidationError::InvalidSize {
                field: "public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: self.public_key.len(),
            });
        }
        Ok(())
    }
}

impl PublishedKeyRecordV1 {
    pub fn validate(&self) -> ValidationResult<()> {
        check_id("user_id", &self.user_id, sizes::MAX_ID_LEN)?;
        check_id("device_id", &self.device_id, sizes::MAX_ID_LEN)?;
        check_id("key_id", &self.key_id, sizes::MAX_KEY_ID_LEN)?;
        if self.public_key.len() != sizes::X25519_PUB_SIZE {
            return Err(ValidationError::InvalidSize {
                field: "public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: self.public_key.len(),
            });
        }
        Ok(())
    }
}

impl EnvelopeV1 {
    /// Shape checks that hold for every scheme this core can open.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.nonce.len() != sizes::NONCE_SIZE {
            return Err(ValidationError::InvalidSize {
                field: "nonce",
                expected: sizes::NONCE_SIZE,
                actual: self.nonce.len(),
            });
        }
        if self.ephemeral_public_key.len() != sizes::X25519_PUB_SIZE {
            return Err(ValidationError::InvalidSize {
                field: "ephemeral_public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: self.ephemeral_public_key.len(),
            });
        }
        if self.ciphertext.len() < sizes::TAG_SIZE {
            return Err(ValidationError::SizeOutOfRange {
                field: "ciphertext",
                min: sizes::TAG_SIZE,
                max: usize::MAX,
                actual: self.ciphertext.len(),
            });
        }
        if let Some(key_id) = &self.recipient_key_id {
            check_id("recipient_key_id", key_id, sizes::MAX_KEY_ID_LEN)?;
        }
        if let Some(device_id) = &self.recipient_device_id {
            check_id("recipient_device_id", device_id, sizes::MAX_ID_LEN)?;
        }
        Ok(())
    }
}

impl PayloadV1 {
    pub fn validate(&self) -> ValidationResult<()> {
        let kind = MediaKindV1::try_from(self.kind)
            .map_err(|_| ValidationError::InvalidData { field: "kind", reason: "unknown media kind" })?;
        if self.mime_type.len() > sizes::MAX_MIME_LEN {
            return Err(ValidationError::SizeOutOfRange {
                field: "mime_type",
                min: 0,
                max: sizes::MAX_MIME_LEN,
                actual: self.mime_type.len(),
            });
        }
        match kind {
            MediaKindV1::Unspecified => Err(ValidationError::EmptyField { field: "kind" }),
            MediaKindV1::Text => {
                if self.duration_ms != 0 {
                    return Err(ValidationError::InvalidData { field: "duration_ms", reason: "text has no duration" });
                }
                std::str::from_utf8(&self.body)
                    .map(|_| ())
                    .map_err(|_| ValidationError::InvalidData { field: "body", reason: "text must be UTF-8" })
            }
            MediaKindV1::Audio | MediaKindV1::Video => {
                if self.mime_type.is_empty() {
                    return Err(ValidationError::EmptyField { field: "mime_type" });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_envelope() -> EnvelopeV1 {
        EnvelopeV1 {
            ciphertext: vec![0u8; 20],
            nonce: vec![1u8; 24],
            ephemeral_public_key: vec![2u8; 32],
            recipient_key_id: Some("0b5c6f9e-8a37-4d0f-9a57-0b1f3f7f2a11".to_string()),
            recipient_device_id: Some("a1b2c3d4".to_string()),
            scheme_version: 2,
        }
    }

    #[test]
    fn test_envelope_valid() {
        assert!(good_envelope().validate().is_ok());
    }

    #[test]
    fn test_envelope_legacy_without_tracking_is_valid() {
        let mut env = good_envelope();
        env.recipient_key_id = None;
        env.recipient_device_id = None;
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_envelope_bad_nonce() {
        let mut env = good_envelope();
        env.nonce = vec![0u8; 12];
        assert_eq!(
            env.validate(),
            Err(ValidationError::InvalidSize { field: "nonce", expected: 24, actual: 12 })
        );
    }

    #[test]
    fn test_envelope_short_ciphertext() {
        let mut env = good_envelope();
        env.ciphertext = vec![0u8; 3];
        assert!(matches!(env.validate(), Err(ValidationError::SizeOutOfRange { field: "ciphertext", .. })));
    }

    #[test]
    fn test_envelope_empty_key_id() {
        let mut env = good_envelope();
        env.recipient_key_id = Some(String::new());
        assert_eq!(env.validate(), Err(ValidationError::EmptyField { field: "recipient_key_id" }));
    }

    #[test]
    fn test_identifier_charset() {
        assert!(validate_identifier("user_id", "alice_01").is_ok());
        assert!(validate_identifier("user_id", "../etc").is_err());
        assert!(validate_identifier("user_id", "a/b").is_err());
        assert!(validate_identifier("user_id", "").is_err());
        assert!(validate_identifier("user_id", ".").is_err());
        assert!(validate_identifier("device_id", "..").is_err());
        assert!(validate_identifier("device_id", "...").is_err());
        assert!(validate_identifier("device_id", "v1.2").is_ok());
    }

    #[test]
    fn test_payload_text_must_be_utf8() {
        let mut p = PayloadV1::text("ok");
        assert!(p.validate().is_ok());
        p.body = vec![0xff, 0xfe];
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_payload_media_requires_mime() {
        let p = PayloadV1::video("", 10, vec![0]);
        assert_eq!(p.validate(), Err(ValidationError::EmptyField { field: "mime_type" }));
        let p = PayloadV1::video("video/mp4", 10, vec![0]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_record_validation() {
        let rec = PublishedKeyRecordV1 {
            user_id: "bob".into(),
            device_id: "dev1".into(),
            public_key: vec![9u8; 32],
            key_id: "k1".into(),
            created_at: 1,
            current: true,
            superseded_at: None,
        };
        assert!(rec.validate().is_ok());
        let mut bad = rec.clone();
        bad.key_id.clear();
        assert!(bad.validate().is_err());
    }
}
