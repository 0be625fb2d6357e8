//! Property-based tests for key validation, scheme gating and SAS sessions.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use hush_crypto::identity::DeviceKeyPair;
    use hush_proto::v1::{EnvelopeV1, SchemeVersionV1};

    use crate::engine::{check_scheme, to_envelope, EncryptionEngine};
    use crate::errors::CoreError;
    use crate::tracker::{validate, KeyValidation};
    use crate::verification::VerificationSession;

    fn key_id() -> impl Strategy<Value = String> {
        "[a-f0-9-]{1,36}"
    }

    fn envelope_with(key_id: Option<String>) -> EnvelopeV1 {
        EnvelopeV1 {
            recipient_key_id: key_id,
            scheme_version: SchemeVersionV1::X25519HkdfXchacha20poly1305 as u32,
            ..Default::default()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Validation depends only on the two key ids.
        #[test]
        fn test_validate_matches_string_equality(stored in key_id(), current in key_id()) {
            let envelope = envelope_with(Some(stored.clone()));
            let first = validate(&envelope, &current);
            prop_assert_eq!(&first, &validate(&envelope, &current));
            if stored == current {
                prop_assert_eq!(first, KeyValidation::Match);
            } else {
                prop_assert_eq!(
                    first.into_result(),
                    Err(CoreError::KeyDriftDetected { stored_key_id: stored, current_key_id: current })
                );
            }
        }

        #[test]
        fn test_untracked_envelope_is_legacy(current in key_id()) {
            prop_assert_eq!(validate(&envelope_with(None), &current), KeyValidation::Legacy);
        }

        // Only the current scheme is accepted.
        #[test]
        fn test_only_current_scheme_accepted(version in any::<u32>()) {
            let accepted = check_scheme(version).is_ok();
            prop_assert_eq!(accepted, version == SchemeVersionV1::X25519HkdfXchacha20poly1305 as u32);
        }

        // Arbitrary plaintext survives the engine and the wire envelope.
        #[test]
        fn test_engine_round_trip(
            secret in any::<[u8; 32]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..4096),
        ) {
            let recipient = DeviceKeyPair::from_secret_bytes(secret, "dev").unwrap();
            let engine = EncryptionEngine::new();
            let sealed = engine.encrypt(&plaintext, recipient.public_key()).unwrap();
            let envelope = to_envelope(sealed, Some("k1".into()), Some("dev".into()));
            prop_assert_eq!(engine.decrypt(&envelope, &recipient).unwrap(), plaintext);
        }

        // Both ends derive the same code regardless of key order.
        #[test]
        fn test_sas_session_symmetry(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
            context in "[a-z0-9-]{1,24}",
        ) {
            let local = VerificationSession::new(a, b, context.clone());
            let remote = VerificationSession::new(b, a, context);
            prop_assert_eq!(local.code(), remote.code());
        }

        // Same keys and context always give the same code.
        #[test]
        fn test_sas_session_deterministic(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
        ) {
            let one = VerificationSession::new(a, b, "conv-1");
            let two = VerificationSession::new(a, b, "conv-1");
            prop_assert_eq!(one.code(), two.code());
        }

        // Substituting the peer key changes the code.
        #[test]
        fn test_sas_detects_substituted_key(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
            c in any::<[u8; 32]>(),
        ) {
            prop_assume!(b != c);
            let genuine = VerificationSession::new(a, b, "conv-1");
            let substituted = VerificationSession::new(a, c, "conv-1");
            prop_assert_ne!(genuine.code(), substituted.code());
        }
    }
}
