//! Pedalock Client
//!
//! Drives the sans-IO session engine from [`pedalock_core`] over an async
//! backend [`Gateway`].
//!
//! # Architecture
//!
//! [`Ride`] performs the unlock, update and lock round-trips for one bike and
//! commits lifecycle transitions only after the backend confirms them.
//! [`spawn_ride`] moves a ride into a tokio task that sends periodic
//! telemetry until the ride is locked, cancelled or its handle is dropped.
//!
//! # Components
//!
//! - [`Gateway`]: one async method per backend endpoint
//! - [`Ride`]: unlock / update / lock for a single ride
//! - [`RideHandle`]: control surface of a spawned ride
//! - [`MalfunctionReport`]: post-ride malfunction reports
//! - [`Fleet`]: provisioning, maintenance and destruction
//! - [`SystemEnv`]: OS randomness for production use

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod fleet;
mod gateway;
mod report;
mod ride;
mod system_env;
mod telemetry;

pub use error::{FleetError, RideError};
pub use fleet::Fleet;
pub use gateway::{Gateway, GatewayError};
pub use pedalock_core::{Environment, wire::Severity};
pub use report::MalfunctionReport;
pub use ride::Ride;
pub use system_env::SystemEnv;
pub use telemetry::{
    DEFAULT_COMMAND_BUFFER, DEFAULT_UPDATE_INTERVAL, RideConfig, RideHandle, RideSnapshot,
    spawn_ride,
};
