//! MITM verification with short authentication strings.
//!
//! Each conversation context gets one [`VerificationSession`]. Both users see
//! five symbols derived from the two public keys and the context id; if the
//! relay substituted a key, the symbols differ. The protocol only detects: on
//! a reported mismatch the caller is expected to end the conversation.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use hush_crypto::hash::fingerprint;
use hush_crypto::sas::{sas_symbols, SasCode};
use hush_crypto::utils::constant_time_compare_array;

use crate::audit::{AuditSink, SecurityEvent};
use crate::errors::CoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("invalid verification transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: VerificationState,
        to: VerificationState,
    },

    #[error("no verification session for context {0}")]
    UnknownContext(String),

    /// A mismatch was reported; the context stays closed until teardown.
    #[error("verification context {0} was rejected as compromised")]
    ContextCompromised(String),
}

impl From<VerificationError> for CoreError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::ContextCompromised(context_id) => CoreError::MitmSuspected { context_id },
            other => CoreError::InvalidTransition(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationState {
    Unverified,
    Comparing,
    Verified,
    Rejected,
    Skipped,
}

impl VerificationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VerificationState::Verified | VerificationState::Rejected | VerificationState::Skipped
        )
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationOutcome {
    Verified,
    Rejected,
    Skipped,
}

/// Result of [`VerificationRegistry::check_for_key_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChangeStatus {
    Unchanged,
    /// Peer key differs from the one last verified (or last compared); the
    /// session was reset to `Unverified` with the new symbols.
    ReverificationRequired { previous: SasCode, current: SasCode },
}

/// One comparison between the local device and a peer in a given context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    context_id: String,
    local_public_key: [u8; 32],
    peer_public_key: [u8; 32],
    code: SasCode,
    state: VerificationState,
}

impl VerificationSession {
    pub fn new(local_public_key: [u8; 32], peer_public_key: [u8; 32], context_id: impl Into<String>) -> Self {
        let context_id = context_id.into();
        let code = sas_symbols(&local_public_key, &peer_public_key, &context_id);
        Self {
            context_id,
            local_public_key,
            peer_public_key,
            code,
            state: VerificationState::Unverified,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn peer_public_key(&self) -> &[u8; 32] {
        &self.peer_public_key
    }

    pub fn local_public_key(&self) -> &[u8; 32] {
        &self.local_public_key
    }

    /// Symbols to show the user.
    pub fn code(&self) -> &SasCode {
        &self.code
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn outcome(&self) -> Option<VerificationOutcome> {
        match self.state {
            VerificationState::Verified => Some(VerificationOutcome::Verified),
            VerificationState::Rejected => Some(VerificationOutcome::Rejected),
            VerificationState::Skipped => Some(VerificationOutcome::Skipped),
            VerificationState::Unverified | VerificationState::Comparing => None,
        }
    }

    fn transition(&mut self, to: VerificationState) -> Result<(), VerificationError> {
        use VerificationState::*;
        // repeating the outcome already recorded is a no-op
        if self.state == to && to.is_terminal() {
            return Ok(());
        }
        let allowed = matches!(
            (self.state, to),
            (Unverified, Comparing)
                | (Unverified, Skipped)
                | (Comparing, Verified)
                | (Comparing, Rejected)
                | (Comparing, Skipped)
        );
        if !allowed {
            return Err(VerificationError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn start_comparison(&mut self) -> Result<(), VerificationError> {
        self.transition(VerificationState::Comparing)
    }

    pub fn confirm_match(&mut self) -> Result<(), VerificationError> {
        self.transition(VerificationState::Verified)
    }

    pub fn report_mismatch(&mut self) -> Result<(), VerificationError> {
        self.transition(VerificationState::Rejected)
    }

    pub fn skip(&mut self) -> Result<(), VerificationError> {
        self.transition(VerificationState::Skipped)
    }
}

/// Per-context sessions plus the last verified peer key of each context.
pub struct VerificationRegistry {
    sessions: HashMap<String, VerificationSession>,
    verified_keys: HashMap<String, [u8; 32]>,
    audit: Arc<dyn AuditSink>,
}

impl VerificationRegistry {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            sessions: HashMap::new(),
            verified_keys: HashMap::new(),
            audit,
        }
    }

    /// Start (or resume) verification for `context_id`.
    ///
    /// An existing session for the same keys is returned as is, so terminal
    /// outcomes stay sticky. A different peer key goes through
    /// [`check_for_key_change`](Self::check_for_key_change) first. A rejected
    /// context refuses new keys until [`teardown`](Self::teardown).
    pub fn begin_verification(
        &mut self,
        local_public_key: [u8; 32],
        peer_public_key: [u8; 32],
        context_id: &str,
    ) -> Result<&VerificationSession, VerificationError> {
        let existing = self.sessions.get(context_id).map(|s| {
            (
                constant_time_compare_array(s.local_public_key(), &local_public_key),
                constant_time_compare_array(s.peer_public_key(), &peer_public_key),
            )
        });
        match existing {
            Some((true, true)) => {}
            Some((same_local, same_peer)) => {
                if !same_peer {
                    self.check_for_key_change(context_id, peer_public_key)?;
                }
                if !same_local {
                    if self.session(context_id).map(VerificationSession::state)
                        == Some(VerificationState::Rejected)
                    {
                        return Err(VerificationError::ContextCompromised(context_id.to_string()));
                    }
                    // our own key was reset; the old symbols no longer apply
                    self.verified_keys.remove(context_id);
                    self.sessions.insert(
                        context_id.to_string(),
                        VerificationSession::new(local_public_key, peer_public_key, context_id),
                    );
                }
            }
            None => {
                self.sessions.insert(
                    context_id.to_string(),
                    VerificationSession::new(local_public_key, peer_public_key, context_id),
                );
            }
        }

        let session = self.session_mut(context_id)?;
        if session.state() == VerificationState::Unverified {
            session.start_comparison()?;
            info!(context_id, "verification started");
        }
        Ok(session)
    }

    pub fn session(&self, context_id: &str) -> Option<&VerificationSession> {
        self.sessions.get(context_id)
    }

    fn session_mut(&mut self, context_id: &str) -> Result<&mut VerificationSession, VerificationError> {
        self.sessions
            .get_mut(context_id)
            .ok_or_else(|| VerificationError::UnknownContext(context_id.to_string()))
    }

    /// User confirmed both screens show the same symbols.
    pub fn confirm_match(&mut self, context_id: &str) -> Result<(), VerificationError> {
        let session = self.session_mut(context_id)?;
        session.confirm_match()?;
        let peer = *session.peer_public_key();
        self.verified_keys.insert(context_id.to_string(), peer);
        info!(context_id, peer_fingerprint = %fingerprint(&peer), "peer key verified");
        Ok(())
    }

    /// User reported different symbols.
    ///
    /// Returns the error the caller should surface before tearing the
    /// conversation down: `MitmSuspected`, or the transition error if the
    /// session was already in another terminal state.
    pub fn report_mismatch(&mut self, context_id: &str) -> CoreError {
        let session = match self.session_mut(context_id) {
            Ok(session) => session,
            Err(e) => return e.into(),
        };
        if let Err(e) = session.report_mismatch() {
            return e.into();
        }
        let peer_fingerprint = fingerprint(session.peer_public_key());
        self.verified_keys.remove(context_id);

        error!(
            target: "hush::security",
            context_id,
            peer_fingerprint = %peer_fingerprint,
            "SAS mismatch reported, possible man-in-the-middle"
        );
        self.audit.record(SecurityEvent::MitmReported {
            context_id: context_id.to_string(),
            peer_fingerprint,
        });
        CoreError::MitmSuspected {
            context_id: context_id.to_string(),
        }
    }

    /// User chose not to compare.
    pub fn skip(&mut self, context_id: &str) -> Result<(), VerificationError> {
        self.session_mut(context_id)?.skip()?;
        info!(context_id, "verification skipped");
        Ok(())
    }

    /// Compare the peer's current key with the last verified (or compared) one.
    ///
    /// On a change the session restarts from `Unverified` with symbols for
    /// the new key, unless the context was rejected: then the change is still
    /// logged and audited but the context stays closed.
    pub fn check_for_key_change(
        &mut self,
        context_id: &str,
        current_peer_key: [u8; 32],
    ) -> Result<KeyChangeStatus, VerificationError> {
        let session = self
            .sessions
            .get(context_id)
            .ok_or_else(|| VerificationError::UnknownContext(context_id.to_string()))?;
        let previous_key = self
            .verified_keys
            .get(context_id)
            .copied()
            .unwrap_or(*session.peer_public_key());

        if constant_time_compare_array(&previous_key, &current_peer_key) {
            return Ok(KeyChangeStatus::Unchanged);
        }

        let rejected = session.state() == VerificationState::Rejected;
        let local = *session.local_public_key();
        self.verified_keys.remove(context_id);

        let previous_fingerprint = fingerprint(&previous_key);
        let current_fingerprint = fingerprint(&current_peer_key);
        warn!(
            target: "hush::security",
            context_id,
            previous_fingerprint = %previous_fingerprint,
            current_fingerprint = %current_fingerprint,
            rejected,
            "peer key changed, re-verification required"
        );
        self.audit.record(SecurityEvent::PeerKeyChanged {
            context_id: context_id.to_string(),
            previous_fingerprint,
            current_fingerprint,
        });
        if rejected {
            return Err(VerificationError::ContextCompromised(context_id.to_string()));
        }

        let previous = sas_symbols(&local, &previous_key, context_id);
        let fresh = VerificationSession::new(local, current_peer_key, context_id);
        let current = *fresh.code();
        self.sessions.insert(context_id.to_string(), fresh);
        Ok(KeyChangeStatus::ReverificationRequired { previous, current })
    }

    /// Forget everything about `context_id`.
    pub fn teardown(&mut self, context_id: &str) -> bool {
        self.verified_keys.remove(context_id);
        self.sessions.remove(context_id).is_some()
    }
}
