
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::envelope::{open, seal, EnvelopeError};
    use crate::identity::DeviceKeyPair;
    use crate::sas::{sas_symbols, SAS_SYMBOLS};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // decrypt(encrypt(P)) == P
        #[test]
        fn test_seal_open_round_trip(
            secret in any::<[u8; 32]>(),
            payload in prop::collection::vec(any::<u8>(), 0..2048),
        ) {
            let recipient = DeviceKeyPair::from_secret_bytes(secret, "dev").unwrap();
            let sealed = seal(&payload, recipient.public_key()).unwrap();
            let opened = open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &recipient).unwrap();
            prop_assert_eq!(opened, payload);
        }

        // Two seals of the same plaintext share no nonce, ephemeral key or ciphertext.
        #[test]
        fn test_seal_is_not_deterministic(payload in prop::collection::vec(any::<u8>(), 1..256)) {
            let recipient = DeviceKeyPair::generate().unwrap();
            let a = seal(&payload, recipient.public_key()).unwrap();
            let b = seal(&payload, recipient.public_key()).unwrap();
            prop_assert_ne!(a.nonce, b.nonce);
            prop_assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
            prop_assert_ne!(a.ciphertext, b.ciphertext);
        }

        // Flipping any single ciphertext bit is caught by the MAC.
        #[test]
        fn test_single_byte_tamper_detected(
            payload in prop::collection::vec(any::<u8>(), 1..512),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let recipient = DeviceKeyPair::generate().unwrap();
            let mut sealed = seal(&payload, recipient.public_key()).unwrap();
            let i = index.index(sealed.ciphertext.len());
            sealed.ciphertext[i] ^= flip;
            prop_assert_eq!(
                open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &recipient),
                Err(EnvelopeError::AuthenticationFailed)
            );
        }

        // Any private key other than the recipient's fails.
        #[test]
        fn test_foreign_key_fails(
            recipient_secret in any::<[u8; 32]>(),
            other_secret in any::<[u8; 32]>(),
            payload in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let recipient = DeviceKeyPair::from_secret_bytes(recipient_secret, "r").unwrap();
            let other = DeviceKeyPair::from_secret_bytes(other_secret, "o").unwrap();
            prop_assume!(recipient.public_key() != other.public_key());
            let sealed = seal(&payload, recipient.public_key()).unwrap();
            prop_assert_eq!(
                open(&sealed.ciphertext, &sealed.nonce, &sealed.ephemeral_public_key, &other),
                Err(EnvelopeError::AuthenticationFailed)
            );
        }

        #[test]
        fn test_sas_symmetric_and_in_table(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
            ctx in "[a-z0-9-]{1,40}",
        ) {
            let left = sas_symbols(&a, &b, &ctx);
            let right = sas_symbols(&b, &a, &ctx);
            prop_assert_eq!(left, right);
            for s in left.symbols() {
                prop_assert!((s.index as usize) < SAS_SYMBOLS.len());
            }
        }

        #[test]
        fn test_sas_changes_with_key(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
            byte in 0usize..32,
        ) {
            let mut substituted = b;
            substituted[byte] ^= 0x01;
            prop_assert_ne!(sas_symbols(&a, &b, "ctx"), sas_symbols(&a, &substituted, "ctx"));
        }
    }
}
