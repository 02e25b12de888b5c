//! Shared key derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// Passphrase embedded in every client and bike.
pub const DEFAULT_PASSPHRASE: &[u8] = b"bike";

/// Label used for field cipher key derivation
const FIELD_KEY_LABEL: &[u8] = b"pedalockFieldCipherV1";

/// Size of an AES-256 key in bytes
const KEY_SIZE: usize = 32;

/// Symmetric key shared by clients, bikes and the backend.
///
/// Derived from a passphrase so the embedded secret never has to be a raw
/// 32-byte constant. Zeroized on drop.
#[derive(Clone)]
pub struct SharedKey {
    bytes: [u8; KEY_SIZE],
}

impl SharedKey {
    /// Derive a key from a passphrase.
    ///
    /// Deterministic: the same passphrase always yields the same key.
    pub fn from_passphrase(passphrase: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, passphrase);

        let mut bytes = [0u8; KEY_SIZE];
        let Ok(()) = hkdf.expand(FIELD_KEY_LABEL, &mut bytes) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Default for SharedKey {
    fn default() -> Self {
        Self::from_passphrase(DEFAULT_PASSPHRASE)
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey").finish_non_exhaustive()
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = SharedKey::from_passphrase(b"bike");
        let b = SharedKey::from_passphrase(b"bike");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn default_uses_embedded_passphrase() {
        let key = SharedKey::default();
        assert_eq!(key.as_bytes(), SharedKey::from_passphrase(DEFAULT_PASSPHRASE).as_bytes());
    }

    #[test]
    fn different_passphrases_produce_different_keys() {
        let a = SharedKey::from_passphrase(b"bike");
        let b = SharedKey::from_passphrase(b"trike");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let rendered = format!("{:?}", SharedKey::default());
        assert_eq!(rendered, "SharedKey { .. }");
    }
}
