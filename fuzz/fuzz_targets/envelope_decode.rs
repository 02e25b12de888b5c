//! Fuzz target for decrypt_fields
//!
//! Feeds arbitrary strings to the envelope decoder to find:
//! - Panics on short or non-base64 input
//! - Slicing errors around the nonce and tag boundaries
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pedalock_crypto::{decrypt_fields, SharedKey};

fuzz_target!(|data: &str| {
    let _ = decrypt_fields(data, &SharedKey::default());
});
