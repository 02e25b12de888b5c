//! End-to-end ride scenario.
//!
//! Provisions one bike against a [`SimGateway`], unlocks it, rides due north
//! in fixed steps while the telemetry actor reports, then locks. Used by the
//! `pedalock-sim` binary and by tests under a paused clock.

use std::{f64::consts::PI, sync::Arc, time::Duration};

use pedalock_client::{Fleet, FleetError, RideConfig, RideError, spawn_ride};
use pedalock_core::{Bike, Coordinate, geo::EARTH_RADIUS_KM, wire::LockReceipt};
use pedalock_crypto::SharedKey;
use thiserror::Error;
use tokio::sync::watch;

use crate::{SimEnv, SimGateway, SimGatewayConfig};

/// Series id used for the provisioned bike.
const SCENARIO_SERIES_ID: u64 = 1;

/// Series number used for the provisioned bike.
const SCENARIO_SERIES_NUMBER: &str = "SN-0001";

/// Scenario parameters.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioConfig {
    /// RNG seed shared by client and backend
    pub seed: u64,
    /// Fixes fed to the ride before locking
    pub ticks: u32,
    /// Telemetry period, also the spacing between fixes
    pub interval: Duration,
    /// Northward distance between fixes, in metres
    pub step_meters: f64,
    /// Registration and unlock position
    pub origin: Coordinate,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            ticks: 10,
            interval: Duration::from_secs(1),
            step_meters: 100.0,
            origin: Coordinate::new(120.0, 30.0),
        }
    }
}

/// Outcome of a completed scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Bike as returned by the ride task
    pub bike: Bike,
    /// Receipt from the lock
    pub receipt: LockReceipt,
    /// Kilometres the client accumulated
    pub mileage: f64,
    /// Telemetry updates the backend accepted from the actor
    pub accepted_updates: u64,
    /// Telemetry updates that failed
    pub failed_updates: u64,
    /// Requests the backend received in total
    pub exchanges: usize,
}

/// Scenario failure.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Provisioning failed
    #[error("provisioning failed: {0}")]
    Fleet(#[from] FleetError),

    /// Unlock, telemetry or lock failed
    #[error("ride failed: {0}")]
    Ride(#[from] RideError),
}

/// Run one provision, unlock, ride and lock cycle.
///
/// # Errors
///
/// - `ScenarioError::Fleet` if the bike cannot be provisioned
/// - `ScenarioError::Ride` if the unlock or the lock fails
pub async fn run_scenario(config: ScenarioConfig) -> Result<ScenarioReport, ScenarioError> {
    let env = SimEnv::with_seed(config.seed);
    let gateway =
        Arc::new(SimGateway::new(env.clone(), SharedKey::default(), SimGatewayConfig::default()));
    let fleet = Fleet::new(Arc::clone(&gateway), env, SharedKey::default());

    let mut bike = fleet.register(SCENARIO_SERIES_ID, SCENARIO_SERIES_NUMBER, config.origin).await?;
    let ride = fleet.start_ride(&mut bike, config.origin).await?;

    let (fixes, fix_feed) = watch::channel(config.origin);
    let handle = spawn_ride(ride, bike, fix_feed, RideConfig {
        update_interval: config.interval,
        ..RideConfig::default()
    });

    let mut position = config.origin;
    for _ in 0..config.ticks {
        position = step_north(position, config.step_meters);
        fixes.send_replace(position);
        tokio::time::sleep(config.interval).await;
    }

    let receipt = handle.lock().await?;
    let snapshot = handle.snapshot();
    let bike = handle.join().await?;

    tracing::info!(
        bike_id = bike.id(),
        mileage = snapshot.mileage,
        elapsed = %receipt.elapsed_time,
        charge = %receipt.charge,
        "scenario complete"
    );

    Ok(ScenarioReport {
        bike,
        receipt,
        mileage: snapshot.mileage,
        accepted_updates: snapshot.accepted_updates,
        failed_updates: snapshot.failed_updates,
        exchanges: gateway.exchanges().len(),
    })
}

/// Move `from` north by `meters` along its meridian.
pub fn step_north(from: Coordinate, meters: f64) -> Coordinate {
    let degrees = meters / 1000.0 / EARTH_RADIUS_KM * 180.0 / PI;
    Coordinate::new(from.longitude, from.latitude + degrees)
}

#[cfg(test)]
mod tests {
    use pedalock_core::distance_km;

    use super::*;

    #[test]
    fn step_north_covers_the_requested_distance() {
        let origin = Coordinate::new(120.0, 30.0);
        let moved = step_north(origin, 250.0);

        assert_eq!(moved.longitude, origin.longitude);
        assert!((distance_km(origin, moved) - 0.25).abs() < 1e-9);
    }
}
