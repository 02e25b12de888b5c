//! Bike lifecycle state machine.
//!
//! ```text
//! ┌───────────┐    Unlock     ┌──────────┐
//! │           │──────────────>│ Occupied │
//! │ Available │<──────────────│          │
//! │           │     Lock      └──────────┘
//! │           │
//! │           │  StartMaintenance   ┌─────────────┐
//! │           │────────────────────>│ Unavailable │
//! │           │<────────────────────│             │
//! └───────────┘  FinishMaintenance  └─────────────┘
//!       │ Destroy                          │ Destroy
//!       ↓                                  ↓
//! ┌────────────────────────────────────────────────┐
//! │                   Destroyed                    │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are checked by [`BikeStatus::transition`] without touching any
//! state, then committed by [`Bike::apply`]. Callers commit only after the
//! gateway has confirmed the matching protocol step.

use serde::{Deserialize, Serialize};

use crate::{error::TransitionError, geo::Coordinate};

/// Operational status of a bike.
///
/// The discriminants are the status codes carried in telemetry payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BikeStatus {
    /// Parked and free to rent
    Available = 0,
    /// Rented by a rider
    Occupied = 1,
    /// Under maintenance
    Unavailable = 2,
    /// Retired; terminal
    Destroyed = 3,
}

/// What is asking the bike to change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Unlock handshake and confirm update both succeeded
    Unlock,
    /// Lock exchange succeeded
    Lock,
    /// Maintainer takes the bike out of service
    StartMaintenance,
    /// Maintainer returns the bike to service
    FinishMaintenance,
    /// Manager retires the bike
    Destroy,
}

impl BikeStatus {
    /// Wire status code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Status for a wire code, `None` if unknown.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Available),
            1 => Some(Self::Occupied),
            2 => Some(Self::Unavailable),
            3 => Some(Self::Destroyed),
            _ => None,
        }
    }

    /// Status reached by applying `trigger`.
    ///
    /// # Errors
    ///
    /// - `TransitionError::Illegal` if `trigger` is not valid from `self`
    pub fn transition(self, trigger: Trigger) -> Result<Self, TransitionError> {
        match (self, trigger) {
            (Self::Available, Trigger::Unlock) => Ok(Self::Occupied),
            (Self::Occupied, Trigger::Lock) => Ok(Self::Available),
            (Self::Available, Trigger::StartMaintenance) => Ok(Self::Unavailable),
            (Self::Unavailable, Trigger::FinishMaintenance) => Ok(Self::Available),
            (Self::Available | Self::Unavailable, Trigger::Destroy) => Ok(Self::Destroyed),
            (from, trigger) => Err(TransitionError::Illegal { from, trigger }),
        }
    }

    /// Whether `trigger` is legal from this status.
    pub fn permits(self, trigger: Trigger) -> bool {
        self.transition(trigger).is_ok()
    }

    /// No outbound transitions exist.
    pub fn is_terminal(self) -> bool {
        self == Self::Destroyed
    }
}

/// A lifecycle event together with the data its transition carries.
#[derive(Debug, Clone, PartialEq)]
pub enum BikeEvent {
    /// Ride started
    Unlocked,
    /// Ride ended at `position`
    Locked {
        /// Final position reported by the ride
        position: Coordinate,
    },
    /// Maintenance started
    MaintenanceStarted,
    /// Maintenance finished and the bike was parked at `position`
    MaintenanceFinished {
        /// Where the maintainer left the bike
        position: Coordinate,
    },
    /// Bike retired
    Destroyed {
        /// Why the manager retired it
        reason: String,
    },
}

impl BikeEvent {
    /// Trigger this event fires.
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::Unlocked => Trigger::Unlock,
            Self::Locked { .. } => Trigger::Lock,
            Self::MaintenanceStarted => Trigger::StartMaintenance,
            Self::MaintenanceFinished { .. } => Trigger::FinishMaintenance,
            Self::Destroyed { .. } => Trigger::Destroy,
        }
    }
}

/// Client-side view of a bike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    id: u64,
    series_number: String,
    status: BikeStatus,
    position: Coordinate,
}

impl Bike {
    /// A freshly activated bike, available at `position`.
    pub fn new(id: u64, series_number: impl Into<String>, position: Coordinate) -> Self {
        Self::with_status(id, series_number, BikeStatus::Available, position)
    }

    /// A bike loaded with a known status (e.g. from a backend listing).
    pub fn with_status(
        id: u64,
        series_number: impl Into<String>,
        status: BikeStatus,
        position: Coordinate,
    ) -> Self {
        Self { id, series_number: series_number.into(), status, position }
    }

    /// Backend-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Physical series number.
    pub fn series_number(&self) -> &str {
        &self.series_number
    }

    /// Current status.
    pub fn status(&self) -> BikeStatus {
        self.status
    }

    /// Last authoritative position.
    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Commit a lifecycle event.
    ///
    /// Status and position change together or not at all. Position changes
    /// only on `Locked` and `MaintenanceFinished`.
    ///
    /// # Errors
    ///
    /// - `TransitionError::Illegal` if the event is not valid from the current
    ///   status. The bike is left untouched.
    pub fn apply(&mut self, event: BikeEvent) -> Result<BikeStatus, TransitionError> {
        let next = self.status.transition(event.trigger())?;

        match event {
            BikeEvent::Locked { position } | BikeEvent::MaintenanceFinished { position } => {
                self.position = position;
            },
            BikeEvent::Unlocked | BikeEvent::MaintenanceStarted | BikeEvent::Destroyed { .. } => {},
        }

        tracing::info!(bike_id = self.id, from = ?self.status, to = ?next, "bike status committed");
        self.status = next;

        Ok(next)
    }
}
