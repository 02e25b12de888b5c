//! Field list encryption using `AES-256-GCM`
//!
//! All functions are pure - the nonce must be provided by the caller.
//! This enables deterministic testing and keeps the session engine sans-IO.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{error::CipherError, key::SharedKey};

/// Separator placed between fields before encryption.
pub const FIELD_DELIMITER: &str = "$";

/// Size of the AES-GCM nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// GCM tag size (16 bytes)
const TAG_SIZE: usize = 16;

/// Seal an ordered field list into a base64 envelope.
///
/// Fields are joined with [`FIELD_DELIMITER`] and encrypted as one UTF-8
/// string. The envelope is `base64(nonce || ciphertext || tag)`.
///
/// # Security
///
/// - Caller MUST NOT reuse a nonce under the same key in production
/// - Authenticated encryption prevents tampering
///
/// # Errors
///
/// - `NoFields`: `fields` is empty
/// - `DelimiterInField`: a field contains [`FIELD_DELIMITER`]
pub fn encrypt_fields<S: AsRef<str>>(
    fields: &[S],
    key: &SharedKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<String, CipherError> {
    if fields.is_empty() {
        return Err(CipherError::NoFields);
    }

    if let Some(index) = fields.iter().position(|f| f.as_ref().contains(FIELD_DELIMITER)) {
        return Err(CipherError::DelimiterInField { index });
    }

    let joined = fields.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(FIELD_DELIMITER);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let Ok(sealed) = cipher.encrypt(Nonce::from_slice(&nonce), joined.as_bytes()) else {
        unreachable!("AES-256-GCM encryption cannot fail for in-memory payloads");
    };

    let mut envelope = Vec::with_capacity(NONCE_SIZE + sealed.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&sealed);

    Ok(STANDARD.encode(envelope))
}

/// Open a base64 envelope and split it back into fields.
///
/// # Errors
///
/// - `Encoding`: not valid base64
/// - `Truncated`: shorter than nonce plus tag
/// - `DecryptionFailed`: wrong key or tampered envelope
/// - `InvalidUtf8`: plaintext is not UTF-8
pub fn decrypt_fields(envelope: &str, key: &SharedKey) -> Result<Vec<String>, CipherError> {
    let bytes = STANDARD
        .decode(envelope.trim())
        .map_err(|e| CipherError::Encoding { reason: e.to_string() })?;

    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::Truncated { len: bytes.len() });
    }

    let (nonce, sealed) = bytes.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CipherError::DecryptionFailed { reason: "authentication failed".to_string() })?;

    let joined = String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)?;

    Ok(joined.split(FIELD_DELIMITER).map(str::to_string).collect())
}
