//! Pedalock Cryptographic Primitives
//!
//! The field cipher used by every Pedalock protocol message. Pure functions
//! with deterministic outputs: callers provide the nonce so encryption can be
//! replayed exactly in tests.
//!
//! # Message Format
//!
//! A message is an ordered list of string fields. Fields are joined with a
//! fixed delimiter and the joined string is sealed under the shared key.
//!
//! ```text
//! ["12345678901234567890", "42"]
//!        │
//!        ▼
//! "12345678901234567890$42"
//!        │
//!        ▼
//! AES-256-GCM (shared key, caller nonce)
//!        │
//!        ▼
//! base64(nonce || ciphertext || tag)
//! ```
//!
//! The envelope is not compatible with the passphrase-mode AES-CBC envelopes
//! of earlier mobile clients. Only the field layout and the `$` delimiter are
//! shared, so a backend must be upgraded together with its clients.
//!
//! # Security
//!
//! Authenticity:
//! - AES-256-GCM rejects tampered or foreign-keyed envelopes
//! - Failed authentication tag -> [`CipherError::DecryptionFailed`]
//!
//! Key material:
//! - One shared secret is embedded in every client, so the cipher only keeps
//!   honest parties' messages apart. It provides no secrecy against a hostile
//!   client holding the same key.
//! - Key bytes are zeroized when the [`SharedKey`] is dropped

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod field_cipher;
mod key;

pub use error::CipherError;
pub use field_cipher::{FIELD_DELIMITER, NONCE_SIZE, decrypt_fields, encrypt_fields};
pub use key::{DEFAULT_PASSPHRASE, SharedKey};
