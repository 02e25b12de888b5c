//! Bike provisioning handshake.
//!
//! One-time registration of a new bike, separate from rides. Same field
//! cipher, two messages:
//!
//! ```text
//! bike ── [series_number, longitude, latitude] ──> backend
//! bike <── [series_number, bike_id] ────────────── backend
//! bike ── [bike_id] ──────────────────────────────> backend
//! ```
//!
//! The backend must echo our series number; anything else means the reply
//! was meant for another bike.

use pedalock_crypto::{SharedKey, decrypt_fields, encrypt_fields};

use crate::{
    bike::Bike,
    env::Environment,
    error::SessionError,
    geo::Coordinate,
    wire::{ActivateRequest, RegisterRequest, format_degrees},
};

/// Fields in the backend's registration echo.
const ECHO_FIELDS: usize = 2;

/// Provisioning state for a bike that has no backend id yet.
#[derive(Debug, Clone)]
pub struct Provisioner {
    series_number: String,
    position: Coordinate,
    key: SharedKey,
}

impl Provisioner {
    /// Provision the bike `series_number` standing at `position`.
    pub fn new(series_number: impl Into<String>, position: Coordinate, key: SharedKey) -> Self {
        Self { series_number: series_number.into(), position, key }
    }

    /// First message: `[series_number, longitude, latitude]`.
    ///
    /// # Errors
    ///
    /// - `SessionError::Decryption` if the series number contains the field
    ///   delimiter
    pub fn register_request<E: Environment>(
        &self,
        series_id: u64,
        env: &E,
    ) -> Result<RegisterRequest, SessionError> {
        let fields = [
            self.series_number.clone(),
            format_degrees(self.position.longitude),
            format_degrees(self.position.latitude),
        ];
        let encrypted = encrypt_fields(&fields, &self.key, env.random_nonce())?;

        Ok(RegisterRequest { series_id, encrypted })
    }

    /// Second message: verify the backend echo and seal `[bike_id]`.
    ///
    /// Returns the assigned bike id together with the activation request.
    ///
    /// # Errors
    ///
    /// - `SessionError::Decryption` if the echo does not open
    /// - `SessionError::FieldCount` if the echo is not `[series, id]`
    /// - `SessionError::AuthenticationMismatch` if the series number differs
    /// - `SessionError::MalformedField` if the id is not an unsigned integer
    pub fn activate_request<E: Environment>(
        &self,
        echo: &str,
        env: &E,
    ) -> Result<(u64, ActivateRequest), SessionError> {
        let fields = decrypt_fields(echo, &self.key)?;

        let [series_number, bike_id] = fields.as_slice() else {
            return Err(SessionError::FieldCount { expected: ECHO_FIELDS, actual: fields.len() });
        };

        if *series_number != self.series_number {
            tracing::warn!(series = %self.series_number, "registration echo for another bike");
            return Err(SessionError::AuthenticationMismatch { field: "series_number" });
        }

        let id: u64 = bike_id
            .parse()
            .map_err(|_| SessionError::MalformedField { field: "bike_id", value: bike_id.clone() })?;

        let encrypted = encrypt_fields(&[bike_id.as_str()], &self.key, env.random_nonce())?;

        Ok((id, ActivateRequest { encrypted }))
    }

    /// The activated bike, available where it was registered.
    pub fn into_bike(self, bike_id: u64) -> Bike {
        Bike::new(bike_id, self.series_number, self.position)
    }
}
