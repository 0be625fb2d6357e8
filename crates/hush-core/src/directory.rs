//! Public key directory client.
//!
//! Publishes this device's public key through the relay and resolves peers'
//! current keys together with the relay-assigned key id that the key
//! consistency tracker stamps on envelopes.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use hush_crypto::hash::fingerprint;
use hush_proto::v1::{PublishKeyRequestV1, PublishedKeyRecordV1};

use crate::config::CoreConfig;
use crate::errors::CoreError;
use crate::relay::{RelayClient, RelayError};

/// A peer key as returned by [`PublicKeyDirectoryClient::resolve_current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub user_id: String,
    pub device_id: String,
    pub public_key: [u8; 32],
    pub key_id: String,
}

impl TryFrom<PublishedKeyRecordV1> for ResolvedKey {
    type Error = RelayError;

    fn try_from(record: PublishedKeyRecordV1) -> Result<Self, Self::Error> {
        record
            .validate()
            .map_err(|e| RelayError::BadResponse(format!("malformed key record: {e}")))?;
        let public_key = record
            .public_key_array()
            .map_err(|e| RelayError::BadResponse(e.to_string()))?;
        Ok(Self {
            user_id: record.user_id,
            device_id: record.device_id,
            public_key,
            key_id: record.key_id,
        })
    }
}

/// Directory client bound to the local user.
#[derive(Clone)]
pub struct PublicKeyDirectoryClient {
    relay: Arc<dyn RelayClient>,
    user_id: String,
    config: CoreConfig,
}

impl PublicKeyDirectoryClient {
    pub fn new(relay: Arc<dyn RelayClient>, user_id: impl Into<String>, config: CoreConfig) -> Self {
        Self {
            relay,
            user_id: user_id.into(),
            config,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn relay(&self) -> &Arc<dyn RelayClient> {
        &self.relay
    }

    /// Applies the configured request timeout to a relay call.
    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, RelayError>>,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.config.request_timeout(), fut).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(CoreError::Timeout),
        }
    }

    /// Uploads `public_key` under `(user_id, device_id)` and returns the
    /// relay-assigned key id.
    ///
    /// Transient failures and timeouts are retried with capped exponential
    /// backoff; permanent failures return at once. Exhausted retries return
    /// the last error.
    pub async fn publish(&self, device_id: &str, public_key: &[u8; 32]) -> Result<String, CoreError> {
        let policy = self.config.publish_retry;
        let request = PublishKeyRequestV1::new(public_key);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = self
                .with_timeout(self.relay.publish_key(&self.user_id, device_id, &request))
                .await;

            let err = match result {
                Ok(record) => {
                    let resolved = ResolvedKey::try_from(record)?;
                    if resolved.public_key != *public_key {
                        return Err(RelayError::BadResponse(
                            "relay returned a different public key".into(),
                        )
                        .into());
                    }
                    info!(
                        user_id = %self.user_id,
                        device_id,
                        key_id = %resolved.key_id,
                        fingerprint = %fingerprint(public_key),
                        attempt,
                        "published device key"
                    );
                    return Ok(resolved.key_id);
                }
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= policy.max_attempts {
                error!(
                    user_id = %self.user_id,
                    device_id,
                    attempt,
                    error = %err,
                    "key publication failed"
                );
                return Err(err);
            }

            let delay = policy.delay_for(attempt);
            warn!(
                user_id = %self.user_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "key publication failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Most recent key record of `peer_user_id`.
    ///
    /// `NotFound` means the peer never published (or cannot reach the relay);
    /// callers present it as a recoverable condition.
    pub async fn resolve_current(&self, peer_user_id: &str) -> Result<ResolvedKey, CoreError> {
        let record = self
            .with_timeout(self.relay.fetch_current(peer_user_id))
            .await
            .map_err(|e| log_lookup_failure(peer_user_id, e))?;
        match record {
            Some(record) => {
                let resolved = ResolvedKey::try_from(record)?;
                debug!(
                    peer_user_id,
                    device_id = %resolved.device_id,
                    key_id = %resolved.key_id,
                    "resolved peer key"
                );
                Ok(resolved)
            }
            None => Err(CoreError::NotFound {
                user_id: peer_user_id.to_string(),
            }),
        }
    }

    /// Current key id of `peer_user_id`, or `None` if the peer has no key.
    pub async fn resolve_key_id(&self, peer_user_id: &str) -> Result<Option<String>, CoreError> {
        match self.resolve_current(peer_user_id).await {
            Ok(resolved) => Ok(Some(resolved.key_id)),
            Err(CoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current record of one specific device.
    pub async fn resolve_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<ResolvedKey>, CoreError> {
        let record = self
            .with_timeout(self.relay.fetch_device_current(user_id, device_id))
            .await
            .map_err(|e| log_lookup_failure(user_id, e))?;
        match record {
            Some(record) => Ok(Some(ResolvedKey::try_from(record)?)),
            None => Ok(None),
        }
    }

    /// Current key id of one specific device.
    pub async fn resolve_device_key_id(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<String>, CoreError> {
        Ok(self
            .resolve_device(user_id, device_id)
            .await?
            .map(|resolved| resolved.key_id))
    }

    /// Every record published for `(user_id, device_id)`, oldest first.
    pub async fn history(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Vec<PublishedKeyRecordV1>, CoreError> {
        let history = self
            .with_timeout(self.relay.fetch_history(user_id, device_id))
            .await?;
        Ok(history.records)
    }
}

fn log_lookup_failure(user_id: &str, err: CoreError) -> CoreError {
    match &err {
        CoreError::Timeout => debug!(user_id, "key lookup timed out"),
        other => warn!(user_id, error = %other, "key lookup failed"),
    }
    err
}

impl std::fmt::Debug for PublicKeyDirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKeyDirectoryClient")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use hush_proto::v1::KeyHistoryV1;

    use crate::config::RetryPolicy;
    use crate::relay::InMemoryRelay;

    fn client(relay: Arc<dyn RelayClient>, user: &str) -> PublicKeyDirectoryClient {
        PublicKeyDirectoryClient::new(relay, user, CoreConfig::default())
    }

    #[tokio::test]
    async fn test_publish_then_resolve() {
        let relay = Arc::new(InMemoryRelay::new());
        let alice = client(relay.clone(), "alice");
        let bob = client(relay, "bob");

        let key_id = alice.publish("d1", &[7u8; 32]).await.unwrap();
        let resolved = bob.resolve_current("alice").await.unwrap();
        assert_eq!(resolved.key_id, key_id);
        assert_eq!(resolved.public_key, [7u8; 32]);
        assert_eq!(resolved.device_id, "d1");
        assert_eq!(bob.resolve_key_id("alice").await.unwrap(), Some(key_id.clone()));
        assert_eq!(bob.resolve_device_key_id("alice", "d1").await.unwrap(), Some(key_id));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_not_found() {
        let bob = client(Arc::new(InMemoryRelay::new()), "bob");
        let err = bob.resolve_current("carol").await.unwrap_err();
        assert_eq!(err, CoreError::NotFound { user_id: "carol".into() });
        assert_eq!(bob.resolve_key_id("carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rotation_changes_key_id_and_keeps_history() {
        let relay = Arc::new(InMemoryRelay::new());
        let alice = client(relay, "alice");
        let k1 = alice.publish("d1", &[1u8; 32]).await.unwrap();
        let k2 = alice.publish("d1", &[2u8; 32]).await.unwrap();
        assert_ne!(k1, k2);
        let history = alice.history("alice", "d1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].key_id, k1);
        assert!(!history[0].current);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_retries_transient_failures() {
        let relay = Arc::new(InMemoryRelay::new());
        relay.fail_next_publishes(3);
        let alice = client(relay, "alice");
        assert!(alice.publish("d1", &[1u8; 32]).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_gives_up_after_max_attempts() {
        let relay = Arc::new(InMemoryRelay::new());
        relay.fail_next_publishes(10);
        let config = CoreConfig {
            publish_retry: RetryPolicy { max_attempts: 3, base_delay_ms: 10, max_delay_ms: 40 },
            ..CoreConfig::default()
        };
        let alice = PublicKeyDirectoryClient::new(relay.clone(), "alice", config);
        let err = alice.publish("d1", &[1u8; 32]).await.unwrap_err();
        assert!(matches!(err, CoreError::Relay(RelayError::Unavailable(_))));
        // three attempts consumed, seven injected failures remain
        relay.fail_next_publishes(0);
        assert!(alice.publish("d1", &[1u8; 32]).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_permanent_failure_is_not_retried() {
        struct Rejecting;
        #[async_trait]
        impl RelayClient for Rejecting {
            async fn publish_key(&self, _: &str, _: &str, _: &PublishKeyRequestV1) -> Result<PublishedKeyRecordV1, RelayError> {
                Err(RelayError::Rejected { status: 403 })
            }
            async fn fetch_current(&self, _: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
                Ok(None)
            }
            async fn fetch_device_current(&self, _: &str, _: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
                Ok(None)
            }
            async fn fetch_history(&self, _: &str, _: &str) -> Result<KeyHistoryV1, RelayError> {
                Ok(KeyHistoryV1::default())
            }
            async fn put_blob(&self, _: &str, _: Bytes) -> Result<(), RelayError> {
                Ok(())
            }
            async fn get_blob(&self, _: &str) -> Result<Option<Bytes>, RelayError> {
                Ok(None)
            }
        }
        let rejecting = PublicKeyDirectoryClient::new(Arc::new(Rejecting), "alice", CoreConfig::default());
        let err = rejecting.publish("d1", &[1u8; 32]).await.unwrap_err();
        assert_eq!(err, CoreError::Relay(RelayError::Rejected { status: 403 }));
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_relay_times_out() {
        let relay = Arc::new(InMemoryRelay::new());
        let alice = client(relay.clone(), "alice");
        alice.publish("d1", &[1u8; 32]).await.unwrap();
        relay.set_delay(Some(Duration::from_secs(30))).await;

        let err = alice.resolve_current("alice").await.unwrap_err();
        assert_eq!(err, CoreError::Timeout);
        assert!(err.is_retryable());
    }
}
