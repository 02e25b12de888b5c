//! Maintainer and manager operations.
//!
//! Same commit rule as rides: the local bike changes state only after the
//! gateway answers `ok: true`, and illegal transitions are rejected before
//! any request is sent.

use std::sync::Arc;

use pedalock_core::{
    Bike, BikeEvent, Coordinate, Environment, Provisioner, Trigger, WireError,
    wire::{DestroyRecord, FinishMaintenanceRequest, MaintenanceRequest, Reply},
};
use pedalock_crypto::SharedKey;

use crate::{
    error::{FleetError, RideError},
    gateway::{Gateway, GatewayError},
    ride::Ride,
};

/// Fleet-side driver bound to one gateway.
pub struct Fleet<G: Gateway, E: Environment> {
    gateway: Arc<G>,
    env: E,
    key: SharedKey,
}

impl<G: Gateway, E: Environment> Fleet<G, E> {
    /// Create a driver talking to `gateway`.
    pub fn new(gateway: Arc<G>, env: E, key: SharedKey) -> Self {
        Self { gateway, env, key }
    }

    /// Register and activate a new bike.
    ///
    /// # Errors
    ///
    /// - `FleetError::Gateway` / `FleetError::Rejected` if either exchange fails
    /// - `FleetError::Malformed` if the registration reply carries no echo
    /// - `FleetError::Session` if the echo names another bike or cannot be
    ///   opened
    pub async fn register(
        &self,
        series_id: u64,
        series_number: impl Into<String>,
        position: Coordinate,
    ) -> Result<Bike, FleetError> {
        let provisioner = Provisioner::new(series_number, position, self.key.clone());

        let request = provisioner.register_request(series_id, &self.env)?;
        let echo = confirmed(self.gateway.register(request).await, "register")?
            .data
            .ok_or(WireError::MissingData { operation: "register" })?;

        let (bike_id, activation) = provisioner.activate_request(&echo, &self.env)?;
        confirmed(self.gateway.activate(activation).await, "activate")?;

        let bike = provisioner.into_bike(bike_id);
        tracing::info!(bike_id, series = bike.series_number(), "bike provisioned");

        Ok(bike)
    }

    /// Take `bike` out of service.
    ///
    /// # Errors
    ///
    /// - `FleetError::Transition` unless the bike is Available
    /// - `FleetError::Gateway` / `FleetError::Rejected` if the exchange fails
    pub async fn start_maintenance(&self, bike: &mut Bike) -> Result<(), FleetError> {
        bike.status().transition(Trigger::StartMaintenance)?;

        let request = MaintenanceRequest { bike_id: bike.id() };
        confirmed(self.gateway.start_maintenance(request).await, "start_maintenance")?;

        bike.apply(BikeEvent::MaintenanceStarted)?;
        Ok(())
    }

    /// Return `bike` to service at `position`.
    ///
    /// # Errors
    ///
    /// - `FleetError::Transition` unless the bike is Unavailable
    /// - `FleetError::Gateway` / `FleetError::Rejected` if the exchange fails
    pub async fn finish_maintenance(
        &self,
        bike: &mut Bike,
        position: Coordinate,
    ) -> Result<(), FleetError> {
        bike.status().transition(Trigger::FinishMaintenance)?;

        let request = FinishMaintenanceRequest::new(bike.id(), position);
        confirmed(self.gateway.finish_maintenance(request).await, "finish_maintenance")?;

        bike.apply(BikeEvent::MaintenanceFinished { position })?;
        Ok(())
    }

    /// Retire `bike` permanently.
    ///
    /// # Errors
    ///
    /// - `FleetError::Transition` if the bike is Occupied or already Destroyed
    /// - `FleetError::Gateway` / `FleetError::Rejected` if the exchange fails
    pub async fn destroy(
        &self,
        bike: &mut Bike,
        reason: impl Into<String>,
    ) -> Result<DestroyRecord, FleetError> {
        bike.status().transition(Trigger::Destroy)?;

        let record = DestroyRecord { bike_id: bike.id(), reason: reason.into() };
        confirmed(self.gateway.destroy(record.clone()).await, "destroy")?;

        bike.apply(BikeEvent::Destroyed { reason: record.reason.clone() })?;
        Ok(record)
    }

    /// Unlock `bike` for a ride with this fleet's gateway and key.
    ///
    /// # Errors
    ///
    /// - any error from [`Ride::unlock`]
    pub async fn start_ride(
        &self,
        bike: &mut Bike,
        origin: Coordinate,
    ) -> Result<Ride<G, E>, RideError> {
        Ride::unlock(Arc::clone(&self.gateway), self.env.clone(), self.key.clone(), bike, origin)
            .await
    }
}

fn confirmed(
    reply: Result<Reply, GatewayError>,
    operation: &'static str,
) -> Result<Reply, FleetError> {
    let reply = reply?;
    if reply.ok { Ok(reply) } else { Err(FleetError::Rejected { operation }) }
}
