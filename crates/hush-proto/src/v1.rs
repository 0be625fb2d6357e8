//! Version 1 protocol messages.

/// Media framing carried inside an encrypted payload.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MediaKindV1 {
    Unspecified = 0,
    Text = 1,
    Audio = 2,
    Video = 3,
}

/// Envelope encryption schemes, as persisted in `EnvelopeV1.scheme_version`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SchemeVersionV1 {
    Unspecified = 0,
    /// Pre-AEAD envelopes. Never decrypted by this core.
    LegacyUnauthenticated = 1,
    /// Ephemeral X25519 + HKDF-SHA256 + XChaCha20-Poly1305.
    X25519HkdfXchacha20poly1305 = 2,
}

/// Body of `PUT /keys/{userId}/{deviceId}`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishKeyRequestV1 {
    /// Raw X25519 public key (32 bytes).
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
}

/// A public key record held by the relay.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishedKeyRecordV1 {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub device_id: String,
    /// Raw X25519 public key (32 bytes).
    #[prost(bytes = "vec", tag = "3")]
    pub public_key: Vec<u8>,
    /// Relay-assigned identifier, distinct from the key bytes.
    #[prost(string, tag = "4")]
    pub key_id: String,
    /// Unix milliseconds.
    #[prost(uint64, tag = "5")]
    pub created_at: u64,
    #[prost(bool, tag = "6")]
    pub current: bool,
    /// Unix milliseconds, set once a newer key replaced this one.
    #[prost(uint64, optional, tag = "7")]
    pub superseded_at: Option<u64>,
}

/// Every record ever published for one `(userId, deviceId)`, oldest first.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyHistoryV1 {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<PublishedKeyRecordV1>,
}

/// Encrypted message or media object as stored alongside application messages.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvelopeV1 {
    /// AEAD ciphertext including the 16-byte tag.
    #[prost(bytes = "vec", tag = "1")]
    pub ciphertext: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ephemeral_public_key: Vec<u8>,
    /// Absent on envelopes produced before key tracking existed.
    #[prost(string, optional, tag = "4")]
    pub recipient_key_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub recipient_device_id: Option<String>,
    /// Preserved verbatim, see `SchemeVersionV1`.
    #[prost(uint32, tag = "6")]
    pub scheme_version: u32,
}

/// Plaintext framing sealed inside an `EnvelopeV1`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PayloadV1 {
    #[prost(enumeration = "MediaKindV1", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub mime_type: String,
    /// Media duration; zero for text.
    #[prost(uint64, tag = "3")]
    pub duration_ms: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub body: Vec<u8>,
}
