//! Gateway request and reply bodies.
//!
//! Each exchange is a single POST carrying an opaque encrypted payload keyed
//! by bike id. Replies carry an `ok` flag and, depending on the exchange,
//! either an encrypted echo or plain comma-separated `data`.
//!
//! Numeric fields inside encrypted payloads are decimal strings with a fixed
//! number of fractional digits; [`format_mileage`] and [`format_degrees`]
//! produce them.

use serde::{Deserialize, Serialize};

use crate::{error::WireError, geo::Coordinate};

/// Separator inside plain reply `data`.
const DATA_SEPARATOR: char = ',';

/// Unlock handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// Target bike
    pub bike_id: u64,
    /// `[token, bike_id]` sealed with the field cipher
    pub encrypted: String,
}

/// Unlock handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockReply {
    /// Gateway accepted the request
    pub ok: bool,
    /// Sealed echo whose first field must be our token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<String>,
}

/// Update or lock telemetry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRequest {
    /// Target bike
    pub bike_id: u64,
    /// `[token, status, mileage, longitude, latitude]` sealed with the field
    /// cipher
    pub encrypted: String,
}

/// Bike registration request (first provisioning message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Series (model) the bike belongs to
    pub series_id: u64,
    /// `[series_number, longitude, latitude]` sealed with the field cipher
    pub encrypted: String,
}

/// Bike activation request (second provisioning message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateRequest {
    /// `[bike_id]` sealed with the field cipher
    pub encrypted: String,
}

/// Start-maintenance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    /// Target bike
    pub bike_id: u64,
}

/// Finish-maintenance request with the bike's new parking position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishMaintenanceRequest {
    /// Target bike
    pub bike_id: u64,
    /// Longitude, six decimals
    pub p_longitude: String,
    /// Latitude, six decimals
    pub p_latitude: String,
}

impl FinishMaintenanceRequest {
    /// Request for `bike_id` parked at `position`.
    pub fn new(bike_id: u64, position: Coordinate) -> Self {
        Self {
            bike_id,
            p_longitude: format_degrees(position.longitude),
            p_latitude: format_degrees(position.latitude),
        }
    }
}

/// Destruction record submitted by a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyRecord {
    /// Retired bike
    pub bike_id: u64,
    /// Free-text reason
    pub reason: String,
}

/// Generic gateway reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Gateway accepted the request
    pub ok: bool,
    /// Exchange-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Reply {
    /// Accepted, with payload.
    pub fn accepted(data: impl Into<String>) -> Self {
        Self { ok: true, data: Some(data.into()) }
    }

    /// Accepted, no payload.
    pub fn ack() -> Self {
        Self { ok: true, data: None }
    }

    /// Rejected.
    pub fn rejected() -> Self {
        Self { ok: false, data: None }
    }
}

/// Elapsed time and running charge reported on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideProgress {
    /// Elapsed ride time as rendered by the backend
    pub elapsed_time: String,
    /// Running charge as rendered by the backend
    pub charge: String,
}

impl RideProgress {
    /// Parse `elapsed_time,charge`.
    ///
    /// # Errors
    ///
    /// - `WireError::MalformedData` if the field count is not two
    pub fn parse(data: &str) -> Result<Self, WireError> {
        match data.split(DATA_SEPARATOR).collect::<Vec<_>>().as_slice() {
            [elapsed_time, charge] => Ok(Self {
                elapsed_time: (*elapsed_time).to_string(),
                charge: (*charge).to_string(),
            }),
            _ => Err(WireError::MalformedData { operation: "update", data: data.to_string() }),
        }
    }
}

/// Final settlement returned by a successful lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReceipt {
    /// Total ride time
    pub elapsed_time: String,
    /// Final charge
    pub charge: String,
    /// Ride record id, used to attach post-ride malfunction reports
    pub record_id: u64,
}

impl LockReceipt {
    /// Parse `elapsed_time,charge,record_id`.
    ///
    /// # Errors
    ///
    /// - `WireError::MalformedData` if the field count is not three or the
    ///   record id is not an unsigned integer
    pub fn parse(data: &str) -> Result<Self, WireError> {
        let malformed = || WireError::MalformedData { operation: "lock", data: data.to_string() };

        match data.split(DATA_SEPARATOR).collect::<Vec<_>>().as_slice() {
            [elapsed_time, charge, record_id] => Ok(Self {
                elapsed_time: (*elapsed_time).to_string(),
                charge: (*charge).to_string(),
                record_id: record_id.trim().parse().map_err(|_| malformed())?,
            }),
            _ => Err(malformed()),
        }
    }
}

/// Severity a rider assigns to a reported malfunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Cosmetic or barely noticeable
    Minor,
    /// Noticeable but the bike is rideable
    Moderate,
    /// The bike should not be ridden
    Severe,
    /// Riding the bike is dangerous
    SafetyHazard,
}

impl Severity {
    /// Degree sent to the backend.
    pub fn degree(self) -> u8 {
        match self {
            Self::Minor => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
            Self::SafetyHazard => 10,
        }
    }

    /// Parse a degree sent to the backend.
    pub fn from_degree(degree: u8) -> Option<Self> {
        match degree {
            1 => Some(Self::Minor),
            2 => Some(Self::Moderate),
            3 => Some(Self::Severe),
            10 => Some(Self::SafetyHazard),
            _ => None,
        }
    }
}

/// Malfunction reported against a finished ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalfunctionRecord {
    /// Ride record id from the [`LockReceipt`]
    pub ride_id: u64,
    /// Catalogue id of the malfunctioning part
    pub malfunction_id: u64,
    /// [`Severity::degree`]
    pub degree: u8,
    /// Free-text description
    pub description: String,
}

impl MalfunctionRecord {
    /// Record against the ride settled by `receipt`.
    pub fn new(
        receipt: &LockReceipt,
        malfunction_id: u64,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            ride_id: receipt.record_id,
            malfunction_id,
            degree: severity.degree(),
            description: description.into(),
        }
    }

    /// Severity, if the degree is one the backend knows.
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_degree(self.degree)
    }
}

/// Render mileage in kilometres with exactly three decimals.
pub fn format_mileage(km: f64) -> String {
    format!("{:.3}", normalize_zero(km))
}

/// Render a longitude or latitude with exactly six decimals.
pub fn format_degrees(degrees: f64) -> String {
    format!("{:.6}", normalize_zero(degrees))
}

// -0.0 renders as "-0.000"; the backend expects "0.000".
fn normalize_zero(value: f64) -> f64 {
    value + 0.0
}
