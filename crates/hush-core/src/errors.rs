//! Error types for hush core.
//!
//! `CoreError` carries the typed failures the conversation layer must tell
//! apart: a stale key (`KeyDriftDetected`) is a bug to recover from, a failed
//! MAC (`AuthenticationFailed`) is tampering or corruption, and a reported SAS
//! mismatch (`MitmSuspected`) ends the conversation.

use thiserror::Error;

use hush_crypto::envelope::EnvelopeError;
use hush_crypto::identity::IdentityError;
use hush_proto::validation::ValidationError;

use crate::relay::RelayError;
use crate::secure_storage::SecureStorageError;

// ============================================================================
// Unified Core Error
// ============================================================================

/// Unified error type for hush core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Local secure storage unreachable (device locked, keychain error).
    #[error("secure storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Peer has no published key.
    #[error("no published key for user {user_id}")]
    NotFound { user_id: String },

    /// AEAD verification failed.
    #[error("authentication failed: envelope could not be verified")]
    AuthenticationFailed,

    /// Envelope was encrypted to a key that is no longer current.
    #[error("key drift detected: envelope encrypted to key {stored_key_id}, current key is {current_key_id}")]
    KeyDriftDetected {
        stored_key_id: String,
        current_key_id: String,
    },

    /// A user reported that the short authentication strings differ.
    #[error("possible man-in-the-middle in conversation {context_id}")]
    MitmSuspected { context_id: String },

    /// Relay request failed.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Relay request exceeded the configured timeout.
    #[error("timeout: relay did not answer in time")]
    Timeout,

    /// Envelope or payload failed structural checks.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Envelope scheme is legacy or unknown.
    #[error("unsupported envelope scheme {0}")]
    UnsupportedScheme(u32),

    /// Illegal state machine transition.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Local cryptographic failure unrelated to the peer (RNG, bad key bytes).
    #[error("crypto error: {0}")]
    Crypto(String),
}

// ============================================================================
// User-facing categories
// ============================================================================

/// How the conversation layer should present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserFacingError {
    /// "This message can't be decrypted right now, your contact's device may have changed."
    ContactKeyChanged,
    /// "This connection may be compromised."
    ConnectionCompromised,
    /// Contact has not published a key or cannot be reached right now.
    ContactUnavailable,
    /// Local problem that a retry may fix.
    TryAgain,
    /// Message was damaged or forged.
    MessageCorrupted,
    /// Message was produced by an unsupported client version.
    UpdateRequired,
}

impl CoreError {
    /// Category shown to the user. Drift and MITM never share a category.
    pub fn user_facing(&self) -> UserFacingError {
        match self {
            CoreError::KeyDriftDetected { .. } => UserFacingError::ContactKeyChanged,
            CoreError::MitmSuspected { .. } => UserFacingError::ConnectionCompromised,
            CoreError::NotFound { .. } | CoreError::Timeout => UserFacingError::ContactUnavailable,
            CoreError::AuthenticationFailed | CoreError::InvalidEnvelope(_) => {
                UserFacingError::MessageCorrupted
            }
            CoreError::UnsupportedScheme(_) => UserFacingError::UpdateRequired,
            CoreError::StorageUnavailable(_)
            | CoreError::Relay(_)
            | CoreError::InvalidTransition(_)
            | CoreError::Crypto(_) => UserFacingError::TryAgain,
        }
    }

    /// Whether retrying the same operation can succeed.
    ///
    /// `AuthenticationFailed` and `MitmSuspected` are never retryable;
    /// `KeyDriftDetected` is recoverable only by re-resolving and re-encrypting.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::StorageUnavailable(_) | CoreError::Timeout | CoreError::NotFound { .. } => true,
            CoreError::Relay(e) => e.is_transient(),
            CoreError::KeyDriftDetected { .. }
            | CoreError::AuthenticationFailed
            | CoreError::MitmSuspected { .. }
            | CoreError::InvalidEnvelope(_)
            | CoreError::UnsupportedScheme(_)
            | CoreError::InvalidTransition(_)
            | CoreError::Crypto(_) => false,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<EnvelopeError> for CoreError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::AuthenticationFailed => CoreError::AuthenticationFailed,
            other => CoreError::Crypto(other.to_string()),
        }
    }
}

impl From<IdentityError> for CoreError {
    fn from(e: IdentityError) -> Self {
        CoreError::Crypto(e.to_string())
    }
}

impl From<SecureStorageError> for CoreError {
    fn from(e: SecureStorageError) -> Self {
        CoreError::StorageUnavailable(e.to_string())
    }
}

impl From<ValidationError> for CoreError {
    fn from(e: ValidationError) -> Self {
        CoreError::InvalidEnvelope(e.to_string())
    }
}
