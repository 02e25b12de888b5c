//! Fuzz target for the Session state machine
//!
//! # Strategy
//!
//! - Arbitrary sequences of session operations in any state
//! - Echoes that are faithful, forged, or raw garbage
//! - Fixes anywhere on the globe, including the poles and the antimeridian
//!
//! # Invariants
//!
//! - Mileage never decreases
//! - Only a faithful echo activates the session
//! - A failed unlock returns to Idle without a token
//! - A closed session never leaves Closed

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pedalock_core::{Coordinate, Environment, Session, SessionState};
use pedalock_crypto::{encrypt_fields, SharedKey, NONCE_SIZE};

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

#[derive(Debug, Arbitrary)]
enum Echo {
    Faithful,
    Forged(String),
    Garbage(String),
}

#[derive(Debug, Arbitrary)]
enum Op {
    SetPosition { longitude: i32, latitude: i32 },
    BeginUnlock,
    CompleteUnlock(Echo),
    Telemetry,
    BeginLock,
    CompleteLock,
    AbortLock,
    Abandon,
}

fuzz_target!(|ops: Vec<Op>| {
    let key = SharedKey::default();
    let mut session = Session::new(1, "SN-1", key.clone());

    for op in ops {
        let before = session.state();
        let mileage = session.mileage();

        match op {
            Op::SetPosition { longitude, latitude } => {
                // Scale into valid degree ranges.
                let fix = Coordinate::new(
                    f64::from(longitude) / f64::from(i32::MAX) * 180.0,
                    f64::from(latitude) / f64::from(i32::MAX) * 90.0,
                );
                let _ = session.set_position(fix);
            },
            Op::BeginUnlock => {
                let _ = session.begin_unlock(&FuzzEnv);
            },
            Op::CompleteUnlock(echo) => {
                let envelope = match &echo {
                    Echo::Faithful => session
                        .token()
                        .and_then(|t| encrypt_fields(&[t, "1"], &key, [1; NONCE_SIZE]).ok()),
                    Echo::Forged(token) => {
                        encrypt_fields(&[token.as_str(), "1"], &key, [2; NONCE_SIZE]).ok()
                    },
                    Echo::Garbage(raw) => Some(raw.clone()),
                };
                let Some(envelope) = envelope else { continue };
                let forged_matches =
                    matches!(&echo, Echo::Forged(t) if Some(t.as_str()) == session.token());

                match session.complete_unlock(&envelope) {
                    Ok(()) => {
                        assert_eq!(before, SessionState::Unlocking);
                        assert!(matches!(echo, Echo::Faithful) || forged_matches);
                        assert_eq!(session.state(), SessionState::Active);
                    },
                    Err(_) if before == SessionState::Unlocking => {
                        assert_eq!(session.state(), SessionState::Idle);
                        assert!(session.token().is_none());
                    },
                    Err(_) => assert_eq!(session.state(), before),
                }
            },
            Op::Telemetry => {
                let _ = session.telemetry(&FuzzEnv);
                assert_eq!(session.state(), before);
            },
            Op::BeginLock => {
                let _ = session.begin_lock(&FuzzEnv);
            },
            Op::CompleteLock => {
                let _ = session.complete_lock();
            },
            Op::AbortLock => {
                let _ = session.abort_lock();
            },
            Op::Abandon => session.abandon(),
        }

        assert!(session.mileage() >= mileage);
        assert!(session.mileage().is_finite());
        if before == SessionState::Closed {
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(session.mileage(), mileage);
        }
    }
});
