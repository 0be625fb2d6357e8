//! Relay client capability.
//!
//! The relay is untrusted: it stores public key records and opaque envelope
//! blobs and never sees plaintext or private keys. Everything the core needs
//! from it goes through [`RelayClient`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use hush_proto::v1::{KeyHistoryV1, PublishKeyRequestV1, PublishedKeyRecordV1};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Transport failure (connect, reset, TLS).
    #[error("http error: {0}")]
    Http(String),

    /// Relay answered with something unexpected.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// Relay refused the request (4xx other than 404).
    #[error("rejected by relay with status {status}")]
    Rejected { status: u16 },

    /// Relay is up but temporarily unable to serve (5xx, 429).
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RelayError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Http(_) | RelayError::Unavailable(_))
    }
}

// ============================================================================
// Capability Trait
// ============================================================================

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// `PUT /keys/{user_id}/{device_id}`. The relay assigns the key id.
    async fn publish_key(
        &self,
        user_id: &str,
        device_id: &str,
        request: &PublishKeyRequestV1,
    ) -> Result<PublishedKeyRecordV1, RelayError>;

    /// `GET /keys/{user_id}`: most recently published current record across
    /// the user's devices, or `None`.
    async fn fetch_current(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError>;

    /// `GET /keys/{user_id}/{device_id}`: that device's current record.
    async fn fetch_device_current(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, RelayError>;

    /// `GET /keys/{user_id}/{device_id}/history`: every record, oldest first.
    async fn fetch_history(&self, user_id: &str, device_id: &str) -> Result<KeyHistoryV1, RelayError>;

    /// `PUT /blobs/{blob_id}`.
    async fn put_blob(&self, blob_id: &str, data: Bytes) -> Result<(), RelayError>;

    /// `GET /blobs/{blob_id}`.
    async fn get_blob(&self, blob_id: &str) -> Result<Option<Bytes>, RelayError>;
}

// ============================================================================
// In-memory relay
// ============================================================================

#[derive(Default)]
struct RelayState {
    /// (user_id, device_id) -> records, oldest first; the last one is current.
    keys: HashMap<(String, String), Vec<PublishedKeyRecordV1>>,
    blobs: HashMap<String, Bytes>,
    clock_ms: u64,
}

/// In-process relay with the same semantics as the hush-relay service.
///
/// Supports fault injection (`fail_next_publishes`) and an artificial response
/// delay so retry and timeout paths can be exercised without a network.
#[derive(Default)]
pub struct InMemoryRelay {
    state: RwLock<RelayState>,
    failing_publishes: AtomicU32,
    delay: RwLock<Option<Duration>>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` publish calls fail with a transient error.
    pub fn fail_next_publishes(&self, n: u32) {
        self.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Delay every key lookup by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    /// Number of stored blobs.
    pub async fn blob_count(&self) -> usize {
        self.state.read().await.blobs.len()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.read().await;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl RelayClient for InMemoryRelay {
    async fn publish_key(
        &self,
        user_id: &str,
        device_id: &str,
        request: &PublishKeyRequestV1,
    ) -> Result<PublishedKeyRecordV1, RelayError> {
        if self
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RelayError::Unavailable("injected failure".into()));
        }
        request
            .validate()
            .map_err(|_| RelayError::Rejected { status: 400 })?;

        let mut state = self.state.write().await;
        state.clock_ms += 1;
        let now = state.clock_ms;
        let records = state
            .keys
            .entry((user_id.to_string(), device_id.to_string()))
            .or_default();

        if let Some(current) = records.last() {
            if current.public_key == request.public_key {
                return Ok(current.clone());
            }
        }
        if let Some(previous) = records.last_mut() {
            previous.current = false;
            previous.superseded_at = Some(now);
        }

        let record = PublishedKeyRecordV1 {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            public_key: request.public_key.clone(),
            key_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            current: true,
            superseded_at: None,
        };
        records.push(record.clone());
        debug!(user_id, device_id, key_id = %record.key_id, "in-memory relay published key");
        Ok(record)
    }

    async fn fetch_current(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        self.maybe_delay().await;
        let state = self.state.read().await;
        Ok(state
            .keys
            .iter()
            .filter(|((u, _), _)| u == user_id)
            .filter_map(|(_, records)| records.last())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn fetch_device_current(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        self.maybe_delay().await;
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(&(user_id.to_string(), device_id.to_string()))
            .and_then(|records| records.last())
            .cloned())
    }

    async fn fetch_history(&self, user_id: &str, device_id: &str) -> Result<KeyHistoryV1, RelayError> {
        let state = self.state.read().await;
        let records = state
            .keys
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(KeyHistoryV1 { records })
    }

    async fn put_blob(&self, blob_id: &str, data: Bytes) -> Result<(), RelayError> {
        let mut state = self.state.write().await;
        state.blobs.insert(blob_id.to_string(), data);
        Ok(())
    }

    async fn get_blob(&self, blob_id: &str) -> Result<Option<Bytes>, RelayError> {
        let state = self.state.read().await;
        Ok(state.blobs.get(blob_id).cloned())
    }
}
