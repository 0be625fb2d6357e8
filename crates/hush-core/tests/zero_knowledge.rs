//! Zero-knowledge harness against the in-process relay.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;

use hush_core::config::CoreConfig;
use hush_core::harness::{standard_payloads, Verdict, ZeroKnowledgeHarness};
use hush_core::relay::{InMemoryRelay, RelayClient, RelayError};
use hush_proto::v1::{EnvelopeV1, KeyHistoryV1, MediaKindV1, PayloadV1, PublishKeyRequestV1, PublishedKeyRecordV1};

/// Relay that flips one ciphertext byte of every blob it hands back.
struct CorruptingRelay {
    inner: InMemoryRelay,
}

#[async_trait]
impl RelayClient for CorruptingRelay {
    async fn publish_key(
        &self,
        user_id: &str,
        device_id: &str,
        request: &PublishKeyRequestV1,
    ) -> Result<PublishedKeyRecordV1, RelayError> {
        self.inner.publish_key(user_id, device_id, request).await
    }

    async fn fetch_current(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        self.inner.fetch_current(user_id).await
    }

    async fn fetch_device_current(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        self.inner.fetch_device_current(user_id, device_id).await
    }

    async fn fetch_history(&self, user_id: &str, device_id: &str) -> Result<KeyHistoryV1, RelayError> {
        self.inner.fetch_history(user_id, device_id).await
    }

    async fn put_blob(&self, blob_id: &str, data: Bytes) -> Result<(), RelayError> {
        self.inner.put_blob(blob_id, data).await
    }

    async fn get_blob(&self, blob_id: &str) -> Result<Option<Bytes>, RelayError> {
        let Some(blob) = self.inner.get_blob(blob_id).await? else {
            return Ok(None);
        };
        let mut envelope = EnvelopeV1::decode(blob).map_err(|e| RelayError::Decode(e.to_string()))?;
        envelope.ciphertext[0] ^= 0x01;
        Ok(Some(Bytes::from(envelope.encode_to_vec())))
    }
}

#[tokio::test]
async fn test_standard_payloads_are_zero_knowledge() {
    let relay = Arc::new(InMemoryRelay::new());
    let report = ZeroKnowledgeHarness::new(relay.clone(), CoreConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::ZeroKnowledge, "{:?}", report.failures);
    assert!(report.failures.is_empty());
    assert_eq!(report.cases.len(), standard_payloads().len());

    let kinds: Vec<_> = report.cases.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![MediaKindV1::Text, MediaKindV1::Audio, MediaKindV1::Video]);
    for case in &report.cases {
        assert!(case.legitimate_decrypt_ok);
        assert_eq!(case.attacks_attempted, case.attacks_blocked);
        assert!(case.stored_len > case.plaintext_len);
    }
    assert_eq!(relay.blob_count().await, report.cases.len());
}

#[tokio::test]
async fn test_repeated_body_does_not_leak() {
    let relay = Arc::new(InMemoryRelay::new());
    let payloads = vec![
        PayloadV1::text("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
        PayloadV1::audio("audio/ogg", 20, vec![0u8; 4096]),
    ];
    let report = ZeroKnowledgeHarness::new(relay, CoreConfig::default())
        .with_payloads(payloads)
        .run()
        .await
        .unwrap();

    assert!(report.is_zero_knowledge(), "{:?}", report.failures);
    assert_eq!(report.cases.len(), 2);
}

#[tokio::test]
async fn test_corrupted_blobs_are_compromised() {
    let relay = Arc::new(CorruptingRelay {
        inner: InMemoryRelay::new(),
    });
    let report = ZeroKnowledgeHarness::new(relay, CoreConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Compromised);
    assert!(!report.is_zero_knowledge());
    assert_eq!(report.cases.len(), 3);
    for case in &report.cases {
        assert!(!case.legitimate_decrypt_ok);
        // attackers still fail against damaged ciphertext
        assert_eq!(case.attacks_attempted, case.attacks_blocked);
        assert!(report
            .failures
            .iter()
            .any(|f| f.case == case.kind && f.assertion == "legitimate decrypt succeeds"));
    }
    assert_eq!(report.failures.len(), report.cases.len());
}
