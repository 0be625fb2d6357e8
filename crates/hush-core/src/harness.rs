//! Zero-knowledge harness.
//!
//! Runs real payloads through the real relay path and then plays the relay
//! operator: with nothing but the stored envelope and the published public
//! keys it tries to recover the plaintext. Every attempt must fail, and the
//! legitimate recipient must still get the exact payload back.

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use tracing::{error, info};

use hush_crypto::identity::DeviceKeyPair;
use hush_proto::v1::{EnvelopeV1, MediaKindV1, PayloadV1};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::CoreConfig;
use crate::engine::EncryptionEngine;
use crate::errors::CoreError;
use crate::messenger::SecureMessenger;
use crate::relay::{RelayClient, RelayError};
use crate::secure_storage::MemorySecureStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    ZeroKnowledge,
    Compromised,
}

/// An assertion that did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAssertion {
    pub case: MediaKindV1,
    pub assertion: &'static str,
    pub detail: String,
}

/// What happened for one payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub kind: MediaKindV1,
    pub plaintext_len: usize,
    pub stored_len: usize,
    pub attacks_attempted: usize,
    pub attacks_blocked: usize,
    pub legitimate_decrypt_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub verdict: Verdict,
    pub cases: Vec<CaseReport>,
    pub failures: Vec<FailedAssertion>,
}

impl HarnessReport {
    pub fn is_zero_knowledge(&self) -> bool {
        self.verdict == Verdict::ZeroKnowledge
    }
}

/// Text, audio and video payloads with the framing each media type uses.
pub fn standard_payloads() -> Vec<PayloadV1> {
    vec![
        PayloadV1::text("hello"),
        PayloadV1::audio("audio/ogg; codecs=opus", 1_500, patterned_bytes(2 * 1024, 0x5a)),
        PayloadV1::video("video/mp4", 3_000, patterned_bytes(8 * 1024, 0xa5)),
    ]
}

fn patterned_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

pub struct ZeroKnowledgeHarness {
    relay: Arc<dyn RelayClient>,
    config: CoreConfig,
    payloads: Vec<PayloadV1>,
    audit: Arc<dyn AuditSink>,
}

impl ZeroKnowledgeHarness {
    pub fn new(relay: Arc<dyn RelayClient>, config: CoreConfig) -> Self {
        Self {
            relay,
            config,
            payloads: standard_payloads(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replace the payload set.
    pub fn with_payloads(mut self, payloads: Vec<PayloadV1>) -> Self {
        self.payloads = payloads;
        self
    }

    fn party(&self, user_id: &str) -> SecureMessenger {
        SecureMessenger::new(
            user_id,
            Arc::new(MemorySecureStorage::new()),
            self.relay.clone(),
            self.config.clone(),
            self.audit.clone(),
        )
    }

    /// Run every payload through the relay and attack it.
    ///
    /// Setup failures (relay down, publish refused) are errors, not verdicts.
    pub async fn run(&self) -> Result<HarnessReport, CoreError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let sender_id = format!("zk-sender-{run_id}");
        let recipient_id = format!("zk-recipient-{run_id}");

        let sender = self.party(&sender_id);
        let recipient = self.party(&recipient_id);
        sender.bootstrap().await?;
        recipient.bootstrap().await?;

        let mut cases = Vec::with_capacity(self.payloads.len());
        let mut failures = Vec::new();
        for payload in &self.payloads {
            let case = self
                .run_case(&sender, &recipient, payload, &mut failures)
                .await?;
            cases.push(case);
        }

        let verdict = if failures.is_empty() {
            Verdict::ZeroKnowledge
        } else {
            Verdict::Compromised
        };
        match verdict {
            Verdict::ZeroKnowledge => info!(cases = cases.len(), "zero-knowledge harness passed"),
            Verdict::Compromised => error!(
                target: "hush::security",
                failures = failures.len(),
                "zero-knowledge harness found a confidentiality failure"
            ),
        }
        Ok(HarnessReport { verdict, cases, failures })
    }

    async fn run_case(
        &self,
        sender: &SecureMessenger,
        recipient: &SecureMessenger,
        payload: &PayloadV1,
        failures: &mut Vec<FailedAssertion>,
    ) -> Result<CaseReport, CoreError> {
        let kind = MediaKindV1::try_from(payload.kind).unwrap_or(MediaKindV1::Unspecified);
        let mut fail = |assertion: &'static str, detail: String| {
            failures.push(FailedAssertion { case: kind, assertion, detail });
        };

        // Upload through the relay's blob path and read it back as the relay would.
        let envelope = sender.seal_for(recipient.user_id(), payload).await?;
        let blob_id = uuid::Uuid::new_v4().to_string();
        self.relay
            .put_blob(&blob_id, Bytes::from(envelope.encode_to_vec()))
            .await?;
        let stored = self
            .relay
            .get_blob(&blob_id)
            .await?
            .ok_or_else(|| RelayError::BadResponse(format!("blob {blob_id} missing after upload")))?;
        let observed = EnvelopeV1::decode(stored.as_ref())
            .map_err(|e| CoreError::InvalidEnvelope(format!("stored blob: {e}")))?;

        // Everything below the line uses only relay-visible data.
        let recipient_record = recipient.directory().resolve_current(recipient.user_id()).await?;
        let engine = EncryptionEngine::new();
        let mut attempted = 0usize;
        let mut blocked = 0usize;

        let mut attempts: Vec<(&'static str, DeviceKeyPair)> = vec![
            ("unrelated key cannot decrypt", DeviceKeyPair::generate()?),
            (
                "recipient public key used as private key cannot decrypt",
                DeviceKeyPair::from_secret_bytes(recipient_record.public_key, "attacker")?,
            ),
        ];
        if let Ok(eph) = observed.ephemeral_public_key_array() {
            attempts.push((
                "ephemeral public key used as private key cannot decrypt",
                DeviceKeyPair::from_secret_bytes(eph, "attacker")?,
            ));
        }
        for (assertion, key) in &attempts {
            attempted += 1;
            match engine.decrypt(&observed, key) {
                Ok(_) => fail(*assertion, "decryption succeeded".into()),
                Err(_) => blocked += 1,
            }
        }

        // The sender's own long-term key must not open what it sent.
        attempted += 1;
        let sender_result = sender
            .identity()
            .with_keypair(|kp| engine.decrypt(&observed, kp))
            .await;
        match sender_result {
            Ok(_) => fail("sender long-term key cannot decrypt", "decryption succeeded".into()),
            Err(_) => blocked += 1,
        }

        attempted += 1;
        let framed = payload.encode_to_vec();
        if contains_subslice(&stored, &payload.body) || contains_subslice(&stored, &framed) {
            fail("plaintext absent from stored bytes", "plaintext found in relay blob".into());
        } else {
            blocked += 1;
        }

        // Legitimate path.
        let legitimate_decrypt_ok = match recipient.open(&observed).await {
            Ok(opened) if opened == *payload => true,
            Ok(_) => {
                fail("legitimate decrypt is exact", "payload differs after round trip".into());
                false
            }
            Err(e) => {
                fail("legitimate decrypt succeeds", e.to_string());
                false
            }
        };

        info!(
            kind = %kind,
            stored_len = stored.len(),
            attempted,
            blocked,
            legitimate_decrypt_ok,
            "zero-knowledge case finished"
        );
        Ok(CaseReport {
            kind,
            plaintext_len: payload.body.len(),
            stored_len: stored.len(),
            attacks_attempted: attempted,
            attacks_blocked: blocked,
            legitimate_decrypt_ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::InMemoryRelay;

    #[test]
    fn test_standard_payloads_cover_every_media_kind() {
        let kinds: Vec<i32> = standard_payloads().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![MediaKindV1::Text as i32, MediaKindV1::Audio as i32, MediaKindV1::Video as i32]
        );
        for p in standard_payloads() {
            p.validate().unwrap();
        }
    }

    #[test]
    fn test_contains_subslice() {
        assert!(contains_subslice(b"xxhelloxx", b"hello"));
        assert!(!contains_subslice(b"xxhellxx", b"hello"));
        assert!(!contains_subslice(b"anything", b""));
    }

    #[tokio::test]
    async fn test_harness_passes_over_in_memory_relay() {
        let relay = Arc::new(InMemoryRelay::new());
        let harness = ZeroKnowledgeHarness::new(relay.clone(), CoreConfig::default());
        let report = harness.run().await.unwrap();
        assert!(report.is_zero_knowledge(), "failures: {:?}", report.failures);
        assert_eq!(report.cases.len(), 3);
        for case in &report.cases {
            assert!(case.legitimate_decrypt_ok);
            assert_eq!(case.attacks_attempted, case.attacks_blocked);
            assert_eq!(case.attacks_attempted, 5);
        }
        assert_eq!(relay.blob_count().await, 3);
    }
}
