//! Ride session state machine.
//!
//! Owns the per-ride token, the mileage accumulator and the last GPS fix, and
//! builds every encrypted payload the ride sends. Uses the action pattern:
//! methods take the environment as input and return requests for the caller to
//! send. No I/O happens here; the caller performs the gateway round-trip and
//! feeds the outcome back.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ begin_unlock ┌───────────┐ complete_unlock ┌────────┐
//! │ Idle │─────────────>│ Unlocking │────────────────>│ Active │<─┐
//! └──────┘              └───────────┘                 └────────┘  │
//!    ↑                        │                           │       │ abort_lock
//!    │  bad echo / decrypt    │                begin_lock │       │
//!    └────────────────────────┘                           ↓       │
//!                                                    ┌─────────┐  │
//!                              ┌────────┐ complete   │ Locking │──┘
//!                              │ Closed │<───────────│         │
//!                              └────────┘   _lock    └─────────┘
//! ```
//!
//! # Mileage
//!
//! Every [`Session::set_position`] adds the haversine distance from the
//! previous fix. The first fix only sets the baseline. Mileage is never
//! rolled back: a failed send does not undo the distance already ridden.

use pedalock_crypto::{SharedKey, decrypt_fields, encrypt_fields};

use crate::{
    bike::{Bike, BikeStatus},
    env::Environment,
    error::SessionError,
    geo::{Coordinate, distance_km},
    wire::{TelemetryRequest, UnlockRequest, format_degrees, format_mileage},
};

/// Number of decimal digits in a session token.
pub const TOKEN_DIGITS: usize = 20;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No handshake in progress
    Idle,
    /// Unlock request built, waiting for the gateway echo
    Unlocking,
    /// Handshake verified; telemetry may flow
    Active,
    /// Lock request built, waiting for the gateway
    Locking,
    /// Ride finished or abandoned
    Closed,
}

/// Session engine for one ride attempt on one bike.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Randomness is passed into the methods that need it.
#[derive(Debug, Clone)]
pub struct Session {
    /// Backend id of the bike
    bike_id: u64,
    /// Physical identifier of the bike
    series_number: String,
    /// Shared field cipher key
    key: SharedKey,
    /// Current state
    state: SessionState,
    /// Token of the current handshake; `None` outside a handshake or ride
    token: Option<String>,
    /// Last GPS fix
    position: Option<Coordinate>,
    /// Kilometres ridden since creation
    mileage: f64,
}

impl Session {
    /// Create a new session in [`SessionState::Idle`].
    pub fn new(bike_id: u64, series_number: impl Into<String>, key: SharedKey) -> Self {
        Self {
            bike_id,
            series_number: series_number.into(),
            key,
            state: SessionState::Idle,
            token: None,
            position: None,
            mileage: 0.0,
        }
    }

    /// Create a session bound to `bike`.
    pub fn for_bike(bike: &Bike, key: SharedKey) -> Self {
        Self::new(bike.id(), bike.series_number(), key)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Backend id of the bike this session drives.
    #[must_use]
    pub fn bike_id(&self) -> u64 {
        self.bike_id
    }

    /// Physical series number of the bike.
    #[must_use]
    pub fn series_number(&self) -> &str {
        &self.series_number
    }

    /// Token of the handshake in progress or the active ride.
    ///
    /// Exposed for harness backends that must echo it; never persist it.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Last GPS fix. `None` until the first [`Session::set_position`].
    #[must_use]
    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    /// Kilometres accumulated so far.
    #[must_use]
    pub fn mileage(&self) -> f64 {
        self.mileage
    }

    /// Record a GPS fix and return the distance it added.
    ///
    /// The first fix establishes the baseline and adds nothing. A rejected fix
    /// leaves both the position and the mileage untouched.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if the session is Locking or Closed
    /// - `SessionError::NonFiniteFix` if either coordinate is NaN or infinite
    pub fn set_position(&mut self, fix: Coordinate) -> Result<f64, SessionError> {
        if matches!(self.state, SessionState::Locking | SessionState::Closed) {
            let state = self.state;
            return Err(SessionError::InvalidState { state, operation: "set_position" });
        }
        if !fix.is_finite() {
            tracing::warn!(bike_id = self.bike_id, ?fix, "discarding non-finite fix");
            return Err(SessionError::NonFiniteFix);
        }

        let delta = self.position.map_or(0.0, |previous| distance_km(previous, fix));

        self.mileage += delta;
        self.position = Some(fix);

        Ok(delta)
    }

    /// Start the unlock handshake.
    ///
    /// Generates a fresh token and returns the `[token, bike_id]` request.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Idle state
    /// - `SessionError::Decryption` if the request cannot be sealed
    pub fn begin_unlock<E: Environment>(
        &mut self,
        env: &E,
    ) -> Result<UnlockRequest, SessionError> {
        self.expect_state(SessionState::Idle, "begin_unlock")?;

        let token = generate_token(env);
        let bike_id = self.bike_id.to_string();
        let encrypted =
            encrypt_fields(&[token.as_str(), bike_id.as_str()], &self.key, env.random_nonce())?;

        self.token = Some(token);
        self.state = SessionState::Unlocking;

        tracing::debug!(bike_id = self.bike_id, "unlock request built");

        Ok(UnlockRequest { bike_id: self.bike_id, encrypted })
    }

    /// Verify the gateway's sealed echo.
    ///
    /// The first decrypted field must equal our token. On any failure the
    /// session returns to Idle and the token is discarded.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Unlocking state
    /// - `SessionError::Decryption` if the echo does not open
    /// - `SessionError::AuthenticationMismatch` if the token differs
    pub fn complete_unlock(&mut self, echo: &str) -> Result<(), SessionError> {
        self.expect_state(SessionState::Unlocking, "complete_unlock")?;

        let verdict = match decrypt_fields(echo, &self.key) {
            Ok(fields) if fields.first().map(String::as_str) == self.token.as_deref() => Ok(()),
            Ok(_) => Err(SessionError::AuthenticationMismatch { field: "token" }),
            Err(e) => Err(SessionError::Decryption(e)),
        };

        match verdict {
            Ok(()) => {
                self.state = SessionState::Active;
                tracing::debug!(bike_id = self.bike_id, "unlock echo verified");
                Ok(())
            },
            Err(e) => {
                tracing::warn!(bike_id = self.bike_id, error = %e, "cannot trust gateway");
                self.state = SessionState::Idle;
                self.token = None;
                Err(e)
            },
        }
    }

    /// Build the periodic update request.
    ///
    /// Shape: `[token, occupied, mileage, longitude, latitude]`.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Active state
    /// - `SessionError::MissingPosition` if no fix was recorded
    pub fn telemetry<E: Environment>(&self, env: &E) -> Result<TelemetryRequest, SessionError> {
        self.expect_state(SessionState::Active, "telemetry")?;
        self.telemetry_request(BikeStatus::Occupied, env)
    }

    /// Build the lock request and move to Locking.
    ///
    /// Shape: `[token, available, mileage, longitude, latitude]`.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Active state
    /// - `SessionError::MissingPosition` if no fix was recorded
    pub fn begin_lock<E: Environment>(
        &mut self,
        env: &E,
    ) -> Result<TelemetryRequest, SessionError> {
        self.expect_state(SessionState::Active, "begin_lock")?;

        let request = self.telemetry_request(BikeStatus::Available, env)?;
        self.state = SessionState::Locking;

        tracing::debug!(bike_id = self.bike_id, mileage = self.mileage, "lock request built");

        Ok(request)
    }

    /// Gateway confirmed the lock; close the session.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Locking state
    pub fn complete_lock(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Locking, "complete_lock")?;

        self.state = SessionState::Closed;
        self.token = None;

        Ok(())
    }

    /// Gateway refused the lock; the ride continues.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if not in Locking state
    pub fn abort_lock(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Locking, "abort_lock")?;

        self.state = SessionState::Active;

        Ok(())
    }

    /// Discard the session without a lock exchange.
    pub fn abandon(&mut self) {
        self.state = SessionState::Closed;
        self.token = None;
    }

    fn telemetry_request<E: Environment>(
        &self,
        status: BikeStatus,
        env: &E,
    ) -> Result<TelemetryRequest, SessionError> {
        let position = self.position.ok_or(SessionError::MissingPosition)?;
        let Some(token) = self.token.as_deref() else {
            return Err(SessionError::InvalidState { state: self.state, operation: "telemetry" });
        };

        let fields = [
            token.to_string(),
            status.code().to_string(),
            format_mileage(self.mileage),
            format_degrees(position.longitude),
            format_degrees(position.latitude),
        ];
        let encrypted = encrypt_fields(&fields, &self.key, env.random_nonce())?;

        Ok(TelemetryRequest { bike_id: self.bike_id, encrypted })
    }

    fn expect_state(
        &self,
        expected: SessionState,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState { state: self.state, operation })
        }
    }
}

/// Render a fresh token: 64 random bits as a zero-padded 20-digit decimal.
fn generate_token<E: Environment>(env: &E) -> String {
    format!("{:0width$}", env.random_u64(), width = TOKEN_DIGITS)
}
