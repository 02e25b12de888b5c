//! Ride driver.
//!
//! Wraps a [`Session`] with the gateway round-trips and commits bike
//! transitions only once the backend has confirmed them. The session builds
//! and verifies payloads; this layer performs I/O and decides when the bike
//! may change state.
//!
//! # Commit rule
//!
//! - Unlock is two-phase: handshake, then one confirm update. The bike becomes
//!   Occupied only after both succeed.
//! - Lock moves the bike back to Available only after the gateway accepts the
//!   final telemetry and returns a parseable receipt.

use std::sync::Arc;

use pedalock_core::{
    Bike, BikeEvent, Coordinate, Environment, Session, SessionError, SessionState, Trigger,
    WireError,
    wire::{LockReceipt, Reply, RideProgress, TelemetryRequest},
};
use pedalock_crypto::SharedKey;

use crate::{
    error::RideError,
    gateway::{Gateway, GatewayError},
};

/// An unlocked ride on one bike.
///
/// Only obtainable through [`Ride::unlock`], so holding one means the
/// handshake and confirm both succeeded.
pub struct Ride<G: Gateway, E: Environment> {
    gateway: Arc<G>,
    env: E,
    session: Session,
    progress: Option<RideProgress>,
}

impl<G: Gateway, E: Environment> Ride<G, E> {
    /// Unlock `bike` standing at `origin`.
    ///
    /// Runs the token handshake and the confirm update as one operation. On
    /// any failure the bike is left exactly as it was and the session is
    /// discarded.
    ///
    /// # Errors
    ///
    /// - `RideError::Transition` if the bike is not Available
    /// - `RideError::Gateway` / `RideError::Rejected` if the handshake fails
    /// - `RideError::Session` if the echo does not authenticate
    /// - `RideError::ConfirmFailed` if the confirm update fails
    pub async fn unlock(
        gateway: Arc<G>,
        env: E,
        key: SharedKey,
        bike: &mut Bike,
        origin: Coordinate,
    ) -> Result<Self, RideError> {
        bike.status().transition(Trigger::Unlock)?;

        let mut session = Session::for_bike(bike, key);
        session.set_position(origin)?;

        let request = session.begin_unlock(&env)?;
        let reply = gateway.unlock(request).await?;
        if !reply.ok {
            return Err(RideError::Rejected { operation: "unlock" });
        }

        let Some(echo) = reply.encrypted else {
            return Err(WireError::MissingData { operation: "unlock" }.into());
        };
        session.complete_unlock(&echo)?;

        let mut ride = Self { gateway, env, session, progress: None };

        if let Err(e) = ride.update(origin).await {
            tracing::warn!(bike_id = bike.id(), error = %e, "occupancy confirm failed");
            ride.session.abandon();
            return Err(RideError::ConfirmFailed(Box::new(e)));
        }

        bike.apply(BikeEvent::Unlocked)?;
        tracing::info!(
            bike_id = bike.id(),
            series = ride.session.series_number(),
            "ride started"
        );

        Ok(ride)
    }

    /// Record `fix` and send one telemetry update.
    ///
    /// The fix is recorded before sending, so mileage keeps accumulating even
    /// when the gateway is unreachable. A ride that is no longer active records
    /// nothing.
    ///
    /// # Errors
    ///
    /// - `RideError::Session` if the ride is not active or `fix` is not finite
    /// - `RideError::Gateway` / `RideError::Rejected` / `RideError::Malformed`
    ///   if the exchange fails
    pub async fn update(&mut self, fix: Coordinate) -> Result<RideProgress, RideError> {
        let state = self.session.state();
        if state != SessionState::Active {
            return Err(SessionError::InvalidState { state, operation: "update" }.into());
        }
        self.session.set_position(fix)?;

        let request = self.session.telemetry(&self.env)?;
        let data = expect_data(self.gateway.update(request).await, "update")?;
        let progress = RideProgress::parse(&data)?;

        tracing::debug!(
            bike_id = self.session.bike_id(),
            mileage = self.session.mileage(),
            elapsed = %progress.elapsed_time,
            charge = %progress.charge,
            "telemetry accepted"
        );

        self.progress = Some(progress.clone());
        Ok(progress)
    }

    /// Lock the ride and release `bike`.
    ///
    /// On failure the session returns to Active and the bike stays Occupied,
    /// so the rider can retry.
    ///
    /// # Errors
    ///
    /// - `RideError::WrongBike` if `bike` is not the unlocked bike
    /// - `RideError::Transition` if the bike is not Occupied
    /// - `RideError::Session` if the ride is not active
    /// - `RideError::Gateway` / `RideError::Rejected` / `RideError::Malformed`
    ///   if the exchange fails
    pub async fn lock(&mut self, bike: &mut Bike) -> Result<LockReceipt, RideError> {
        if bike.id() != self.session.bike_id() {
            return Err(RideError::WrongBike {
                expected: self.session.bike_id(),
                actual: bike.id(),
            });
        }
        bike.status().transition(Trigger::Lock)?;

        let request = self.session.begin_lock(&self.env)?;

        match self.exchange_lock(request).await {
            Ok(receipt) => {
                self.session.complete_lock()?;

                let position = self.session.position().unwrap_or_else(|| bike.position());
                bike.apply(BikeEvent::Locked { position })?;

                tracing::info!(
                    bike_id = bike.id(),
                    mileage = self.session.mileage(),
                    record_id = receipt.record_id,
                    "ride locked"
                );
                Ok(receipt)
            },
            Err(e) => {
                self.session.abort_lock()?;
                tracing::warn!(bike_id = bike.id(), error = %e, "lock failed; ride continues");
                Err(e)
            },
        }
    }

    /// Discard the ride without locking. The bike is not touched.
    pub fn abandon(&mut self) {
        tracing::info!(bike_id = self.session.bike_id(), "ride abandoned");
        self.session.abandon();
    }

    /// Backend id of the ridden bike.
    #[must_use]
    pub fn bike_id(&self) -> u64 {
        self.session.bike_id()
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Kilometres ridden so far.
    #[must_use]
    pub fn mileage(&self) -> f64 {
        self.session.mileage()
    }

    /// Last recorded fix.
    #[must_use]
    pub fn position(&self) -> Option<Coordinate> {
        self.session.position()
    }

    /// Progress from the last accepted update.
    #[must_use]
    pub fn progress(&self) -> Option<&RideProgress> {
        self.progress.as_ref()
    }

    /// Underlying session engine.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn exchange_lock(&self, request: TelemetryRequest) -> Result<LockReceipt, RideError> {
        let data = expect_data(self.gateway.lock(request).await, "lock")?;
        Ok(LockReceipt::parse(&data)?)
    }
}

/// Unwrap an accepted reply's `data`.
pub(crate) fn expect_data(
    reply: Result<Reply, GatewayError>,
    operation: &'static str,
) -> Result<String, RideError> {
    let reply = reply?;
    if !reply.ok {
        return Err(RideError::Rejected { operation });
    }
    reply.data.ok_or(RideError::Malformed(WireError::MissingData { operation }))
}
