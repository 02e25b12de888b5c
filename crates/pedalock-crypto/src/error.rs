//! Field cipher errors.

use thiserror::Error;

/// Errors produced while sealing or opening a field list.
///
/// Every variant raised by [`crate::decrypt_fields`] means the envelope cannot
/// be trusted. Callers treat them all as an authentication failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// A field contains the delimiter and would split on decryption
    #[error("field {index} contains the '$' delimiter")]
    DelimiterInField {
        /// Position of the offending field
        index: usize,
    },

    /// Nothing to encrypt
    #[error("field list is empty")]
    NoFields,

    /// Envelope is not valid base64
    #[error("envelope encoding: {reason}")]
    Encoding {
        /// Decoder message
        reason: String,
    },

    /// Envelope is shorter than nonce plus tag
    #[error("envelope truncated: {len} bytes")]
    Truncated {
        /// Decoded length
        len: usize,
    },

    /// AEAD open failed (wrong key or tampered envelope)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for failure
        reason: String,
    },

    /// Plaintext is not UTF-8
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}
