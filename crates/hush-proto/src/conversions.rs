//! Conversions between wire messages and plain Rust values.

use crate::v1::*;
use crate::validation::{sizes, ValidationError};

// ============================================================================
// Scheme versions
// ============================================================================

impl SchemeVersionV1 {
    /// Scheme used for every newly sealed envelope.
    pub const CURRENT: SchemeVersionV1 = SchemeVersionV1::X25519HkdfXchacha20poly1305;

    /// Interpret a persisted `scheme_version`. Unknown values yield `None`.
    pub fn from_wire(value: u32) -> Option<Self> {
        i32::try_from(value)
            .ok()
            .and_then(|v| SchemeVersionV1::try_from(v).ok())
            .filter(|v| *v != SchemeVersionV1::Unspecified)
    }

    pub fn to_wire(self) -> u32 {
        self as i32 as u32
    }
}

// ============================================================================
// Key records
// ============================================================================

impl PublishKeyRequestV1 {
    pub fn new(public_key: &[u8; 32]) -> Self {
        Self {
            public_key: public_key.to_vec(),
        }
    }
}

impl PublishedKeyRecordV1 {
    /// Public key as a fixed-size array.
    pub fn public_key_array(&self) -> Result<[u8; 32], ValidationError> {
        self.public_key
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidSize {
                field: "public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: self.public_key.len(),
            })
    }
}

// ============================================================================
// Envelopes
// ============================================================================

impl EnvelopeV1 {
    pub fn nonce_array(&self) -> Result<[u8; 24], ValidationError> {
        self.nonce
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidSize {
                field: "nonce",
                expected: sizes::NONCE_SIZE,
                actual: self.nonce.len(),
            })
    }

    pub fn ephemeral_public_key_array(&self) -> Result<[u8; 32], ValidationError> {
        self.ephemeral_public_key
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidSize {
                field: "ephemeral_public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: self.ephemeral_public_key.len(),
            })
    }

    /// Parsed scheme, `None` when the stored value is unknown.
    pub fn scheme(&self) -> Option<SchemeVersionV1> {
        SchemeVersionV1::from_wire(self.scheme_version)
    }
}

// ============================================================================
// Payload framing
// ============================================================================

impl PayloadV1 {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MediaKindV1::Text as i32,
            mime_type: "text/plain; charset=utf-8".to_string(),
            duration_ms: 0,
            body: text.into().into_bytes(),
        }
    }

    pub fn audio(mime_type: impl Into<String>, duration_ms: u64, body: Vec<u8>) -> Self {
        Self {
            kind: MediaKindV1::Audio as i32,
            mime_type: mime_type.into(),
            duration_ms,
            body,
        }
    }

    pub fn video(mime_type: impl Into<String>, duration_ms: u64, body: Vec<u8>) -> Self {
        Self {
            kind: MediaKindV1::Video as i32,
            mime_type: mime_type.into(),
            duration_ms,
            body,
        }
    }

    /// Body as UTF-8 text, only for text payloads.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind() != MediaKindV1::Text {
            return None;
        }
        std::str::from_utf8(&self.body).ok()
    }
}

impl std::fmt::Display for MediaKindV1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaKindV1::Unspecified => "unspecified",
            MediaKindV1::Text => "text",
            MediaKindV1::Audio => "audio",
            MediaKindV1::Video => "video",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_from_wire() {
        assert_eq!(
            SchemeVersionV1::from_wire(2),
            Some(SchemeVersionV1::X25519HkdfXchacha20poly1305)
        );
        assert_eq!(
            SchemeVersionV1::from_wire(1),
            Some(SchemeVersionV1::LegacyUnauthenticated)
        );
        assert_eq!(SchemeVersionV1::from_wire(0), None);
        assert_eq!(SchemeVersionV1::from_wire(99), None);
        assert_eq!(SchemeVersionV1::from_wire(u32::MAX), None);
        assert_eq!(SchemeVersionV1::CURRENT.to_wire(), 2);
    }

    #[test]
    fn test_text_payload() {
        let p = PayloadV1::text("hello");
        assert_eq!(p.kind(), MediaKindV1::Text);
        assert_eq!(p.as_text(), Some("hello"));
    }

    #[test]
    fn test_media_payload_is_not_text() {
        let p = PayloadV1::audio("audio/ogg", 1200, vec![1, 2, 3]);
        assert_eq!(p.kind(), MediaKindV1::Audio);
        assert_eq!(p.as_text(), None);
    }

    #[test]
    fn test_public_key_array_rejects_short_key() {
        let rec = PublishedKeyRecordV1 {
            public_key: vec![0u8; 31],
            ..Default::default()
        };
        assert!(matches!(
            rec.public_key_array(),
            Err(ValidationError::InvalidSize { expected: 32, actual: 31, .. })
        ));
    }
}
