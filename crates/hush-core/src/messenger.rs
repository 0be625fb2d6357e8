//! `SecureMessenger`: the data flow of the core wired end to end.
//!
//! identity store -> directory (publish) -> peer directory (resolve) ->
//! engine -> tracker stamp -> relay -> tracker validate -> engine.

use std::sync::Arc;

use prost::Message;
use tokio::sync::Mutex;
use tracing::info;

use hush_crypto::hash::fingerprint;
use hush_crypto::sas::SasCode;
use hush_proto::v1::{EnvelopeV1, PayloadV1};

use crate::audit::{AuditSink, SecurityEvent};
use crate::config::CoreConfig;
use crate::device::DeviceIdentityStore;
use crate::directory::PublicKeyDirectoryClient;
use crate::errors::CoreError;
use crate::relay::RelayClient;
use crate::secure_storage::SecureStorage;
use crate::tracker::KeyConsistencyTracker;
use crate::verification::{KeyChangeStatus, VerificationRegistry, VerificationState};

pub struct SecureMessenger {
    identity: DeviceIdentityStore,
    tracker: KeyConsistencyTracker,
    verification: Mutex<VerificationRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl SecureMessenger {
    pub fn new(
        user_id: impl Into<String>,
        storage: Arc<dyn SecureStorage>,
        relay: Arc<dyn RelayClient>,
        config: CoreConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let identity = DeviceIdentityStore::new(storage, config.storage_service.clone());
        let directory = PublicKeyDirectoryClient::new(relay, user_id, config);
        Self {
            identity,
            tracker: KeyConsistencyTracker::new(directory, audit.clone()),
            verification: Mutex::new(VerificationRegistry::new(audit.clone())),
            audit,
        }
    }

    pub fn identity(&self) -> &DeviceIdentityStore {
        &self.identity
    }

    pub fn directory(&self) -> &PublicKeyDirectoryClient {
        self.tracker.directory()
    }

    pub fn user_id(&self) -> &str {
        self.directory().user_id()
    }

    async fn publish_current(&self) -> Result<String, CoreError> {
        let public = self
            .identity
            .current()
            .await
            .ok_or_else(|| CoreError::StorageUnavailable("device identity not initialized".into()))?;
        let device_id = self
            .identity
            .device_id()
            .await
            .ok_or_else(|| CoreError::StorageUnavailable("device identity not initialized".into()))?;
        self.directory().publish(&device_id, &public).await
    }

    /// Load or create the device identity and publish it. Returns the key id.
    pub async fn bootstrap(&self) -> Result<String, CoreError> {
        self.identity.generate_if_absent().await?;
        let key_id = self.publish_current().await?;
        info!(user_id = %self.user_id(), key_id = %key_id, "messenger ready");
        Ok(key_id)
    }

    /// Replace the device key and republish. Returns the new key id.
    pub async fn reset_identity(&self) -> Result<String, CoreError> {
        let public = self.identity.reset().await?;
        let device_id = self.identity.device_id().await.unwrap_or_default();
        self.audit.record(SecurityEvent::DeviceKeyReset {
            device_id,
            new_fingerprint: fingerprint(&public),
        });
        self.publish_current().await
    }

    /// Seal a framed payload to the current key of `peer_user_id`.
    pub async fn seal_for(&self, peer_user_id: &str, payload: &PayloadV1) -> Result<EnvelopeV1, CoreError> {
        payload.validate()?;
        let plaintext = zeroize::Zeroizing::new(payload.encode_to_vec());
        self.tracker.seal_for(peer_user_id, &plaintext).await
    }

    /// Validate, decrypt and unframe an envelope addressed to this device.
    pub async fn open(&self, envelope: &EnvelopeV1) -> Result<PayloadV1, CoreError> {
        let plaintext = zeroize::Zeroizing::new(self.tracker.open(envelope, &self.identity).await?);
        let payload = PayloadV1::decode(plaintext.as_slice())
            .map_err(|e| CoreError::InvalidEnvelope(format!("payload framing: {e}")))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Start verification with `peer_user_id` and return the symbols to show.
    pub async fn begin_verification(&self, peer_user_id: &str, context_id: &str) -> Result<SasCode, CoreError> {
        let local = self
            .identity
            .current()
            .await
            .ok_or_else(|| CoreError::StorageUnavailable("device identity not initialized".into()))?;
        let peer = self.directory().resolve_current(peer_user_id).await?;
        let mut registry = self.verification.lock().await;
        let session = registry.begin_verification(local, peer.public_key, context_id)?;
        Ok(*session.code())
    }

    pub async fn confirm_match(&self, context_id: &str) -> Result<(), CoreError> {
        self.verification.lock().await.confirm_match(context_id)?;
        Ok(())
    }

    /// Record a mismatch. Always returns an error; the caller must end the
    /// conversation when it is `MitmSuspected`.
    pub async fn report_mismatch(&self, context_id: &str) -> Result<(), CoreError> {
        Err(self.verification.lock().await.report_mismatch(context_id))
    }

    pub async fn skip_verification(&self, context_id: &str) -> Result<(), CoreError> {
        self.verification.lock().await.skip(context_id)?;
        Ok(())
    }

    pub async fn verification_state(&self, context_id: &str) -> Option<VerificationState> {
        self.verification
            .lock()
            .await
            .session(context_id)
            .map(|s| s.state())
    }

    /// Re-resolve the peer's key and compare it with the verified one.
    pub async fn check_for_key_change(&self, peer_user_id: &str, context_id: &str) -> Result<KeyChangeStatus, CoreError> {
        let peer = self.directory().resolve_current(peer_user_id).await?;
        let status = self
            .verification
            .lock()
            .await
            .check_for_key_change(context_id, peer.public_key)?;
        Ok(status)
    }

    /// Drop verification state for a finished conversation.
    pub async fn teardown(&self, context_id: &str) {
        self.verification.lock().await.teardown(context_id);
    }
}
