//! Pedalock Core
//!
//! Sans-IO protocol logic for the bike unlock / telemetry / lock session.
//!
//! # Architecture
//!
//! Everything in this crate is a pure state machine: methods take randomness
//! through an [`Environment`] and return request bodies for the caller to send.
//! The caller (see `pedalock-client`) owns the network and feeds replies back.
//!
//! # Components
//!
//! - [`Session`]: per-ride token, mileage accumulator and payload builder
//! - [`Bike`]: lifecycle state machine driven by confirmed protocol steps
//! - [`Provisioner`]: one-time registration handshake for new bikes
//! - [`geo`]: haversine distance between GPS fixes
//! - [`wire`]: gateway request and reply bodies

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bike;
pub mod env;
pub mod error;
pub mod geo;
pub mod provisioning;
pub mod session;
pub mod wire;

pub use bike::{Bike, BikeEvent, BikeStatus, Trigger};
pub use env::Environment;
pub use error::{SessionError, TransitionError, WireError};
pub use geo::{Coordinate, distance_km};
pub use provisioning::Provisioner;
pub use session::{Session, SessionState};
