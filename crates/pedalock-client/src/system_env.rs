//! Production environment backed by the OS RNG.
//!
//! Tokens and nonces come from getrandom. Not reproducible; tests use the
//! seeded environment from `pedalock-harness` instead.

use pedalock_core::Environment;

/// Production environment using cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without working randomness every token and
/// nonce would be predictable, so there is nothing safe to fall back to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
