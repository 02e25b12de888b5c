//! Fuzz target for the field cipher round trip
//!
//! # Strategy
//!
//! - Arbitrary field lists, including empty lists and fields with `$`
//! - Arbitrary nonces
//! - Single-byte corruption of the resulting envelope
//!
//! # Invariants
//!
//! - Delimiter-free, non-empty lists round-trip exactly
//! - Lists containing the delimiter or no fields are rejected
//! - Any corrupted envelope fails to open

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pedalock_crypto::{decrypt_fields, encrypt_fields, SharedKey, FIELD_DELIMITER, NONCE_SIZE};

#[derive(Debug, Arbitrary)]
struct Input {
    fields: Vec<String>,
    nonce: [u8; NONCE_SIZE],
    flip: Option<(u16, u8)>,
}

fuzz_target!(|input: Input| {
    let key = SharedKey::default();
    let encodable =
        !input.fields.is_empty() && input.fields.iter().all(|f| !f.contains(FIELD_DELIMITER));

    let envelope = match encrypt_fields(input.fields.as_slice(), &key, input.nonce) {
        Ok(envelope) => {
            assert!(encodable, "accepted unencodable fields: {:?}", input.fields);
            envelope
        },
        Err(_) => {
            assert!(!encodable, "rejected encodable fields: {:?}", input.fields);
            return;
        },
    };

    assert_eq!(decrypt_fields(&envelope, &key).unwrap(), input.fields);

    if let Some((position, mask)) = input.flip {
        if mask == 0 || envelope.is_empty() {
            return;
        }
        let mut bytes = envelope.into_bytes();
        let index = usize::from(position) % bytes.len();
        bytes[index] ^= mask;

        // Non-UTF-8 corruption cannot even be presented as an envelope.
        if let Ok(corrupted) = String::from_utf8(bytes) {
            assert!(decrypt_fields(&corrupted, &key).is_err(), "corrupted envelope opened");
        }
    }
});
