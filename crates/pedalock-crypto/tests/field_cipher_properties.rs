//! Property-based tests for the field cipher.
//!
//! Verifies the round-trip and rejection properties across arbitrary field
//! lists, not only the three protocol message shapes.

use pedalock_crypto::{CipherError, NONCE_SIZE, SharedKey, decrypt_fields, encrypt_fields};
use proptest::prelude::*;

/// Printable fields that never contain the delimiter.
fn field_strategy() -> impl Strategy<Value = String> {
    "[^$]{0,24}"
}

proptest! {
    #[test]
    fn prop_round_trip(
        fields in prop::collection::vec(field_strategy(), 1..8),
        nonce in any::<[u8; NONCE_SIZE]>(),
    ) {
        let key = SharedKey::default();
        let envelope = encrypt_fields(&fields, &key, nonce).unwrap();
        let opened = decrypt_fields(&envelope, &key).unwrap();

        prop_assert_eq!(opened, fields);
    }

    #[test]
    fn prop_foreign_key_never_opens(
        fields in prop::collection::vec(field_strategy(), 1..4),
        nonce in any::<[u8; NONCE_SIZE]>(),
        passphrase in "[a-z]{1,12}",
    ) {
        prop_assume!(passphrase != "bike");

        let envelope = encrypt_fields(&fields, &SharedKey::default(), nonce).unwrap();
        let foreign = SharedKey::from_passphrase(passphrase.as_bytes());

        let is_decryption_failure =
            matches!(decrypt_fields(&envelope, &foreign), Err(CipherError::DecryptionFailed { .. }));
        prop_assert!(is_decryption_failure);
    }

    #[test]
    fn prop_delimiter_is_rejected(
        prefix in field_strategy(),
        suffix in field_strategy(),
        nonce in any::<[u8; NONCE_SIZE]>(),
    ) {
        let fields = vec!["token".to_string(), format!("{prefix}${suffix}")];
        let result = encrypt_fields(&fields, &SharedKey::default(), nonce);

        prop_assert_eq!(result, Err(CipherError::DelimiterInField { index: 1 }));
    }

    #[test]
    fn prop_arbitrary_input_never_panics(input in ".{0,128}") {
        let _ = decrypt_fields(&input, &SharedKey::default());
    }
}
