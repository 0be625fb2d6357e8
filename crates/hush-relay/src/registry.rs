//! Key registry: one current record per (user, device), history kept.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use hush_proto::v1::PublishedKeyRecordV1;
use hush_proto::validation::{sizes, validate_identifier, ValidationError};

use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationError),
}

/// Whether a publish created a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Unchanged,
}

pub struct KeyRegistry {
    store: Arc<dyn RecordStore>,
    device_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl KeyRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            device_locks: DashMap::new(),
        }
    }

    fn device_lock(&self, key: &(String, String)) -> Arc<Mutex<()>> {
        self.device_locks.entry(key.clone()).or_default().clone()
    }

    /// Number of devices with a publish in flight.
    pub fn pending_locks(&self) -> usize {
        self.device_locks.len()
    }

    /// Publish `public_key` for `(user_id, device_id)`.
    ///
    /// Re-publishing the current key returns the existing record unchanged;
    /// a different key supersedes the current record under a new key id.
    pub async fn publish(
        &self,
        user_id: &str,
        device_id: &str,
        public_key: &[u8],
    ) -> Result<(PublishedKeyRecordV1, PublishOutcome), RegistryError> {
        validate_identifier("user_id", user_id)?;
        validate_identifier("device_id", device_id)?;
        if public_key.len() != sizes::X25519_PUB_SIZE {
            return Err(ValidationError::InvalidSize {
                field: "public_key",
                expected: sizes::X25519_PUB_SIZE,
                actual: public_key.len(),
            }
            .into());
        }

        let key = (user_id.to_string(), device_id.to_string());
        let lock = self.device_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.publish_locked(user_id, device_id, public_key).await
        };
        drop(lock);
        // the map's own reference is the last one once nobody waits
        self.device_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn publish_locked(
        &self,
        user_id: &str,
        device_id: &str,
        public_key: &[u8],
    ) -> Result<(PublishedKeyRecordV1, PublishOutcome), RegistryError> {
        let previous = self.store.current_for_device(user_id, device_id).await?;
        if let Some(current) = &previous {
            if current.public_key == public_key {
                return Ok((current.clone(), PublishOutcome::Unchanged));
            }
        }

        // strictly increasing per device so history order matches time order
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let created_at = previous
            .as_ref()
            .map_or(now, |p| now.max(p.created_at + 1));

        let record = PublishedKeyRecordV1 {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            public_key: public_key.to_vec(),
            key_id: uuid::Uuid::new_v4().to_string(),
            created_at,
            current: true,
            superseded_at: None,
        };
        self.store.supersede_and_insert(&record, created_at).await?;

        info!(
            user_id,
            device_id,
            key_id = %record.key_id,
            superseded = previous.as_ref().map(|p| p.key_id.as_str()).unwrap_or(""),
            "key published"
        );
        Ok((record, PublishOutcome::Created))
    }

    pub async fn current(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, RegistryError> {
        validate_identifier("user_id", user_id)?;
        Ok(self.store.current_for_user(user_id).await?)
    }

    pub async fn device_current(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, RegistryError> {
        validate_identifier("user_id", user_id)?;
        validate_identifier("device_id", device_id)?;
        Ok(self.store.current_for_device(user_id, device_id).await?)
    }

    pub async fn history(&self, user_id: &str, device_id: &str) -> Result<Vec<PublishedKeyRecordV1>, RegistryError> {
        validate_identifier("user_id", user_id)?;
        validate_identifier("device_id", device_id)?;
        Ok(self.store.history(user_id, device_id).await?)
    }
}
