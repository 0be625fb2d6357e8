//! Key consistency tracker.
//!
//! Sender side: resolve the peer's current key, seal to it, and stamp the
//! envelope with the resolved key id and device id. Receiver side: before
//! touching the AEAD, compare the stamped key id with this device's current
//! key id so a stale key surfaces as `KeyDriftDetected` instead of an opaque
//! MAC failure.

use std::sync::Arc;

use tracing::{debug, warn};

use hush_crypto::identity::DeviceKeyPair;
use hush_crypto::utils::{constant_time_compare, constant_time_compare_array};
use hush_proto::v1::{EnvelopeV1, SchemeVersionV1};

use crate::audit::{AuditSink, SecurityEvent};
use crate::device::DeviceIdentityStore;
use crate::directory::PublicKeyDirectoryClient;
use crate::engine::{to_envelope, EncryptionEngine};
use crate::errors::CoreError;

// ============================================================================
// State machines
// ============================================================================

/// Sender-side envelope lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendState {
    Encrypting,
    KeyResolved,
    Sent,
}

impl SendState {
    fn can_transition_to(self, next: SendState) -> bool {
        matches!(
            (self, next),
            (SendState::Encrypting, SendState::KeyResolved) | (SendState::KeyResolved, SendState::Sent)
        )
    }
}

/// Recipient-side envelope lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveState {
    Received,
    KeyValidating,
    ValidatedMatch,
    Decrypting,
    Decrypted,
    ValidatedMismatch,
    Rejected,
}

impl ReceiveState {
    fn can_transition_to(self, next: ReceiveState) -> bool {
        use ReceiveState::*;
        matches!(
            (self, next),
            (Received, KeyValidating)
                | (KeyValidating, ValidatedMatch)
                | (KeyValidating, ValidatedMismatch)
                | (KeyValidating, Rejected)
                | (ValidatedMatch, Decrypting)
                | (Decrypting, Decrypted)
                | (Decrypting, Rejected)
                | (ValidatedMismatch, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiveState::Decrypted | ReceiveState::Rejected)
    }
}

/// Sender-side record with every state the envelope passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSend {
    history: Vec<SendState>,
}

impl TrackedSend {
    fn new() -> Self {
        Self {
            history: vec![SendState::Encrypting],
        }
    }

    pub fn state(&self) -> SendState {
        self.history.last().copied().unwrap_or(SendState::Encrypting)
    }

    pub fn history(&self) -> &[SendState] {
        &self.history
    }

    fn advance(&mut self, next: SendState) -> Result<(), CoreError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(CoreError::InvalidTransition(format!("{current:?} -> {next:?}")));
        }
        self.history.push(next);
        Ok(())
    }
}

/// Recipient-side record with every state the envelope passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedReceive {
    history: Vec<ReceiveState>,
}

impl TrackedReceive {
    fn new() -> Self {
        Self {
            history: vec![ReceiveState::Received],
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.history.last().copied().unwrap_or(ReceiveState::Received)
    }

    pub fn history(&self) -> &[ReceiveState] {
        &self.history
    }

    fn advance(&mut self, next: ReceiveState) -> Result<(), CoreError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(CoreError::InvalidTransition(format!("{current:?} -> {next:?}")));
        }
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Rejected` unless already terminal.
    fn reject(&mut self) {
        if self.state().is_terminal() {
            return;
        }
        if self.advance(ReceiveState::Rejected).is_err() {
            self.history.push(ReceiveState::Rejected);
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Outcome of comparing an envelope's stamped key id with the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidation {
    Match,
    /// Envelope predates key tracking; decrypt best-effort.
    Legacy,
    Mismatch {
        stored_key_id: String,
        current_key_id: String,
    },
}

impl KeyValidation {
    pub fn into_result(self) -> Result<(), CoreError> {
        match self {
            KeyValidation::Match | KeyValidation::Legacy => Ok(()),
            KeyValidation::Mismatch {
                stored_key_id,
                current_key_id,
            } => Err(CoreError::KeyDriftDetected {
                stored_key_id,
                current_key_id,
            }),
        }
    }
}

/// Compare `envelope.recipient_key_id` with `current_key_id`.
pub fn validate(envelope: &EnvelopeV1, current_key_id: &str) -> KeyValidation {
    match &envelope.recipient_key_id {
        None => KeyValidation::Legacy,
        Some(stored) if constant_time_compare(stored.as_bytes(), current_key_id.as_bytes()) => {
            KeyValidation::Match
        }
        Some(stored) => KeyValidation::Mismatch {
            stored_key_id: stored.clone(),
            current_key_id: current_key_id.to_string(),
        },
    }
}

// ============================================================================
// Tracker
// ============================================================================

pub struct KeyConsistencyTracker {
    directory: PublicKeyDirectoryClient,
    engine: EncryptionEngine,
    audit: Arc<dyn AuditSink>,
}

impl KeyConsistencyTracker {
    pub fn new(directory: PublicKeyDirectoryClient, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            directory,
            engine: EncryptionEngine::new(),
            audit,
        }
    }

    pub fn directory(&self) -> &PublicKeyDirectoryClient {
        &self.directory
    }

    /// Seal `plaintext` to the current key of `peer_user_id`.
    pub async fn seal_for(&self, peer_user_id: &str, plaintext: &[u8]) -> Result<EnvelopeV1, CoreError> {
        let (_, result) = self.seal_for_tracked(peer_user_id, plaintext).await;
        result
    }

    /// Like [`seal_for`](Self::seal_for), also returning the send record.
    pub async fn seal_for_tracked(
        &self,
        peer_user_id: &str,
        plaintext: &[u8],
    ) -> (TrackedSend, Result<EnvelopeV1, CoreError>) {
        let mut tracked = TrackedSend::new();
        let result = self.seal_inner(&mut tracked, peer_user_id, plaintext).await;
        (tracked, result)
    }

    async fn seal_inner(
        &self,
        tracked: &mut TrackedSend,
        peer_user_id: &str,
        plaintext: &[u8],
    ) -> Result<EnvelopeV1, CoreError> {
        let peer = self.directory.resolve_current(peer_user_id).await?;
        tracked.advance(SendState::KeyResolved)?;

        let sealed = self.engine.encrypt(plaintext, &peer.public_key)?;
        let envelope = to_envelope(sealed, Some(peer.key_id), Some(peer.device_id));
        tracked.advance(SendState::Sent)?;

        debug!(
            peer_user_id,
            recipient_key_id = envelope.recipient_key_id.as_deref().unwrap_or_default(),
            "envelope sealed and stamped"
        );
        Ok(envelope)
    }

    /// Validate and open an envelope addressed to this device.
    pub async fn open(&self, envelope: &EnvelopeV1, identity: &DeviceIdentityStore) -> Result<Vec<u8>, CoreError> {
        let (_, result) = self.open_tracked(envelope, identity).await;
        result
    }

    /// Like [`open`](Self::open), also returning the receive record.
    pub async fn open_tracked(
        &self,
        envelope: &EnvelopeV1,
        identity: &DeviceIdentityStore,
    ) -> (TrackedReceive, Result<Vec<u8>, CoreError>) {
        let mut tracked = TrackedReceive::new();
        let result = self.open_inner(&mut tracked, envelope, identity).await;
        if result.is_err() {
            tracked.reject();
        }
        (tracked, result)
    }

    async fn open_inner(
        &self,
        tracked: &mut TrackedReceive,
        envelope: &EnvelopeV1,
        identity: &DeviceIdentityStore,
    ) -> Result<Vec<u8>, CoreError> {
        tracked.advance(ReceiveState::KeyValidating)?;

        // Held until decryption finishes so a reset cannot slip in between.
        let keypair = identity.read_keypair().await?;

        if envelope.recipient_key_id.is_some() {
            let current_key_id = self.local_key_id(&keypair).await?;
            let validation = validate(envelope, &current_key_id);
            if let KeyValidation::Mismatch {
                stored_key_id,
                current_key_id,
            } = &validation
            {
                tracked.advance(ReceiveState::ValidatedMismatch)?;
                warn!(
                    target: "hush::security",
                    stored_key_id = %stored_key_id,
                    current_key_id = %current_key_id,
                    "key drift detected, refusing to decrypt"
                );
                self.audit.record(SecurityEvent::KeyDriftDetected {
                    stored_key_id: stored_key_id.clone(),
                    current_key_id: current_key_id.clone(),
                });
            }
            validation.into_result()?;
        } else {
            debug!("envelope carries no key id, decrypting best-effort");
        }

        tracked.advance(ReceiveState::ValidatedMatch)?;
        tracked.advance(ReceiveState::Decrypting)?;

        let result = self.engine.decrypt(envelope, &keypair);
        match &result {
            Ok(_) => tracked.advance(ReceiveState::Decrypted)?,
            Err(CoreError::AuthenticationFailed) => {
                warn!(
                    target: "hush::security",
                    recipient_key_id = envelope.recipient_key_id.as_deref().unwrap_or_default(),
                    "envelope failed authentication"
                );
                self.audit.record(SecurityEvent::AuthenticationFailed {
                    recipient_key_id: envelope.recipient_key_id.clone(),
                });
            }
            Err(CoreError::UnsupportedScheme(v))
                if SchemeVersionV1::from_wire(*v) == Some(SchemeVersionV1::LegacyUnauthenticated) =>
            {
                self.audit.record(SecurityEvent::LegacySchemeRejected { scheme_version: *v });
            }
            Err(_) => {}
        }
        result
    }

    /// Key id under which the relay publishes `keypair`.
    ///
    /// When the relay's record for this device holds a different public key
    /// (a reset whose republish has not landed), the local key has no key id
    /// yet and [`unpublished_key_id`] stands in for it.
    async fn local_key_id(&self, keypair: &DeviceKeyPair) -> Result<String, CoreError> {
        let user_id = self.directory.user_id();
        let published = self
            .directory
            .resolve_device(user_id, keypair.device_id())
            .await?
            .ok_or_else(|| CoreError::NotFound {
                user_id: user_id.to_string(),
            })?;
        if constant_time_compare_array(&published.public_key, keypair.public_key()) {
            return Ok(published.key_id);
        }

        warn!(
            target: "hush::security",
            device_id = %keypair.device_id(),
            published_key_id = %published.key_id,
            local_fingerprint = %keypair.fingerprint(),
            "local device key is not the published one, republish required"
        );
        Ok(unpublished_key_id(keypair))
    }
}

/// Placeholder key id for a local key the relay does not hold yet.
pub fn unpublished_key_id(keypair: &DeviceKeyPair) -> String {
    format!("{UNPUBLISHED_KEY_PREFIX}{}", keypair.fingerprint())
}

/// Prefix of [`unpublished_key_id`]; relay-assigned key ids never carry it.
pub const UNPUBLISHED_KEY_PREFIX: &str = "unpublished:";
