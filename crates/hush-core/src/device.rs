//! Device identity store.
//!
//! Owns the long-term X25519 key pair for this device. The private key lives
//! only in secure storage and in memory; it is never serialized anywhere else,
//! never logged, and never handed to callers by value. Cryptographic work that
//! needs it goes through [`DeviceIdentityStore::with_keypair`].

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use hush_crypto::identity::DeviceKeyPair;

use crate::errors::CoreError;
use crate::secure_storage::SecureStorage;

/// Account name under which the identity blob is stored.
pub const IDENTITY_ACCOUNT: &str = "device-identity";

/// Holds the device key pair and persists it through a [`SecureStorage`].
pub struct DeviceIdentityStore {
    storage: Arc<dyn SecureStorage>,
    service: String,
    current: RwLock<Option<Arc<DeviceKeyPair>>>,
}

impl DeviceIdentityStore {
    pub fn new(storage: Arc<dyn SecureStorage>, service: impl Into<String>) -> Self {
        Self {
            storage,
            service: service.into(),
            current: RwLock::new(None),
        }
    }

    /// Loads the stored key pair, or generates and stores one if none exists.
    ///
    /// Returns the public key. Idempotent: repeated calls return the same key
    /// until [`reset`](Self::reset). A stored blob that cannot be parsed is
    /// reported as `StorageUnavailable` and left untouched; a silent
    /// regeneration would orphan every envelope addressed to the old key.
    pub async fn generate_if_absent(&self) -> Result<[u8; 32], CoreError> {
        let mut current = self.current.write().await;
        if let Some(kp) = current.as_ref() {
            return Ok(*kp.public_key());
        }

        let kp = match self.storage.get(&self.service, IDENTITY_ACCOUNT).await? {
            Some(blob) => {
                let kp = DeviceKeyPair::from_storage_bytes(&blob).map_err(|e| {
                    warn!(error = %e, "stored device identity is unreadable");
                    CoreError::StorageUnavailable(format!("stored identity unreadable: {e}"))
                })?;
                debug!(fingerprint = %kp.fingerprint(), "loaded device identity");
                kp
            }
            None => {
                let kp = DeviceKeyPair::generate()?;
                self.storage
                    .set(&self.service, IDENTITY_ACCOUNT, &kp.to_storage_bytes())
                    .await?;
                info!(
                    fingerprint = %kp.fingerprint(),
                    device_id = %kp.device_id(),
                    "generated device identity"
                );
                kp
            }
        };

        let public = *kp.public_key();
        *current = Some(Arc::new(kp));
        Ok(public)
    }

    /// Deletes the stored key pair and generates a fresh one.
    ///
    /// Keeps the device id of the loaded identity. Returns the new public key.
    /// The caller must republish it; envelopes sealed to the old key can no
    /// longer be opened.
    pub async fn reset(&self) -> Result<[u8; 32], CoreError> {
        let mut current = self.current.write().await;
        let kp = match current.as_ref() {
            Some(old) => DeviceKeyPair::generate_for_device(old.device_id())?,
            None => DeviceKeyPair::generate()?,
        };
        self.storage.delete(&self.service, IDENTITY_ACCOUNT).await?;
        *current = None;
        self.storage
            .set(&self.service, IDENTITY_ACCOUNT, &kp.to_storage_bytes())
            .await?;
        info!(fingerprint = %kp.fingerprint(), "device identity reset");

        let public = *kp.public_key();
        *current = Some(Arc::new(kp));
        Ok(public)
    }

    /// Current public key, if an identity has been loaded or generated.
    pub async fn current(&self) -> Option<[u8; 32]> {
        self.current.read().await.as_ref().map(|kp| *kp.public_key())
    }

    /// Current device id, if an identity has been loaded or generated.
    pub async fn device_id(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|kp| kp.device_id().to_string())
    }

    /// Read access to the key pair until the guard is dropped.
    ///
    /// `reset` waits for every outstanding guard, so a caller can check the
    /// key against the directory and decrypt with that same key.
    pub async fn read_keypair(&self) -> Result<RwLockReadGuard<'_, Arc<DeviceKeyPair>>, CoreError> {
        RwLockReadGuard::try_map(self.current.read().await, |kp| kp.as_ref())
            .map_err(|_| CoreError::StorageUnavailable("device identity not initialized".into()))
    }

    /// Runs `f` with the key pair.
    ///
    /// A concurrent `reset` waits until `f` returns, so an operation never sees
    /// the key pair change halfway through.
    pub async fn with_keypair<T>(
        &self,
        f: impl FnOnce(&DeviceKeyPair) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let guard = self.current.read().await;
        match guard.as_ref() {
            Some(kp) => f(kp),
            None => Err(CoreError::StorageUnavailable(
                "device identity not initialized".into(),
            )),
        }
    }
}

impl std::fmt::Debug for DeviceIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentityStore")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
