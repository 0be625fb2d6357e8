//! Security incident audit trail.
//!
//! Events carry identifiers only: user ids, device ids, key ids, context ids
//! and public key fingerprints. Never key bytes, nonces or message content.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

/// Security event types recorded by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SecurityEvent {
    /// User reported that the SAS symbols differ.
    MitmReported {
        context_id: String,
        peer_fingerprint: String,
    },
    /// Envelope was encrypted to a key that is no longer current.
    KeyDriftDetected {
        stored_key_id: String,
        current_key_id: String,
    },
    /// A previously verified peer key changed.
    PeerKeyChanged {
        context_id: String,
        previous_fingerprint: String,
        current_fingerprint: String,
    },
    /// Envelope failed AEAD verification.
    AuthenticationFailed {
        recipient_key_id: Option<String>,
    },
    /// Local device key was replaced.
    DeviceKeyReset {
        device_id: String,
        new_fingerprint: String,
    },
    /// Envelope used the pre-AEAD scheme and was refused.
    LegacySchemeRejected {
        scheme_version: u32,
    },
}

impl SecurityEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            SecurityEvent::MitmReported { .. } => "mitm_reported",
            SecurityEvent::KeyDriftDetected { .. } => "key_drift_detected",
            SecurityEvent::PeerKeyChanged { .. } => "peer_key_changed",
            SecurityEvent::AuthenticationFailed { .. } => "authentication_failed",
            SecurityEvent::DeviceKeyReset { .. } => "device_key_reset",
            SecurityEvent::LegacySchemeRejected { .. } => "legacy_scheme_rejected",
        }
    }

    /// Incidents that point at an active attacker rather than a stale key.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::MitmReported { .. } | SecurityEvent::PeerKeyChanged { .. }
        )
    }

    /// Get event details as JSON.
    pub fn details(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({}))
    }
}

/// A recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: SecurityEvent,
}

impl AuditEntry {
    pub fn new(event: SecurityEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Destination for security events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Emits every event as a structured log line on target `hush::security`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        let entry = AuditEntry::new(event);
        let details = entry.event.details();
        if entry.event.is_critical() {
            error!(
                target: "hush::security",
                audit_id = %entry.id,
                event_type = entry.event.event_type(),
                details = %details,
                "security incident"
            );
        } else {
            warn!(
                target: "hush::security",
                audit_id = %entry.id,
                event_type = entry.event.event_type(),
                details = %details,
                "security event"
            );
        }
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: SecurityEvent) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AuditEntry::new(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let e = SecurityEvent::KeyDriftDetected {
            stored_key_id: "k1".into(),
            current_key_id: "k2".into(),
        };
        assert_eq!(e.event_type(), "key_drift_detected");
        assert!(!e.is_critical());
        assert!(SecurityEvent::MitmReported {
            context_id: "c".into(),
            peer_fingerprint: "ab".into()
        }
        .is_critical());
    }

    #[test]
    fn test_details_serialize_identifiers() {
        let e = SecurityEvent::LegacySchemeRejected { scheme_version: 1 };
        let details = e.details();
        assert_eq!(details["LegacySchemeRejected"]["scheme_version"], 1);
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(SecurityEvent::AuthenticationFailed { recipient_key_id: None });
        sink.record(SecurityEvent::LegacySchemeRejected { scheme_version: 1 });
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].id, entries[1].id);
        assert_eq!(entries[1].event.event_type(), "legacy_scheme_rejected");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingAuditSink.record(SecurityEvent::DeviceKeyReset {
            device_id: "d".into(),
            new_fingerprint: "00".into(),
        });
    }
}
