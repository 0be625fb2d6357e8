
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use prost::Message;
    use crate::v1::{EnvelopeV1, MediaKindV1, PayloadV1, PublishedKeyRecordV1};

    prop_compose! {
        fn any_envelope()(
            ciphertext in prop::collection::vec(any::<u8>(), 16..512),
            nonce in prop::array::uniform24(any::<u8>()),
            eph in prop::array::uniform32(any::<u8>()),
            key_id in prop::option::of("[a-z0-9-]{1,36}"),
            device_id in prop::option::of("[a-f0-9]{32}"),
            scheme in any::<u32>(),
        ) -> EnvelopeV1 {
            EnvelopeV1 {
                ciphertext,
                nonce: nonce.to_vec(),
                ephemeral_public_key: eph.to_vec(),
                recipient_key_id: key_id,
                recipient_device_id: device_id,
                scheme_version: scheme,
            }
        }
    }

    proptest! {
        // Persisted envelopes must come back field-for-field, including
        // scheme versions this build does not understand.
        #[test]
        fn test_envelope_persistence_is_lossless(env in any_envelope()) {
            let bytes = env.encode_to_vec();
            let decoded = EnvelopeV1::decode(bytes.as_slice()).unwrap();
            prop_assert_eq!(&decoded, &env);
            prop_assert_eq!(decoded.scheme_version, env.scheme_version);
            prop_assert!(decoded.validate().is_ok());
        }

        #[test]
        fn test_missing_tracking_fields_stay_absent(env in any_envelope()) {
            let mut env = env;
            env.recipient_key_id = None;
            let decoded = EnvelopeV1::decode(env.encode_to_vec().as_slice()).unwrap();
            prop_assert!(decoded.recipient_key_id.is_none());
        }

        #[test]
        fn test_decode_garbage_never_panics(bytes in any::<Vec<u8>>()) {
            let _ = EnvelopeV1::decode(bytes.as_slice());
            let _ = PayloadV1::decode(bytes.as_slice());
            let _ = PublishedKeyRecordV1::decode(bytes.as_slice());
        }

        #[test]
        fn test_unknown_media_kind_reads_as_unspecified(kind in 4i32..i32::MAX) {
            let p = PayloadV1 { kind, ..PayloadV1::text("x") };
            prop_assert_eq!(p.kind(), MediaKindV1::Unspecified);
            prop_assert!(p.validate().is_err());
        }
    }
}
