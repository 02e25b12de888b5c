//! In-memory backend for simulation and tests.
//!
//! `SimGateway` implements [`Gateway`] against a small model of the real
//! backend: it opens and verifies encrypted payloads with the shared key,
//! tracks each bike's lifecycle with the same state machine the client uses,
//! and bills rides by elapsed time on the tokio clock. Under a paused test
//! runtime the clock only moves when the test advances it.
//!
//! Every request is logged before faults are applied, so tests can assert on
//! what the client actually sent. [`FaultPlan`] injects outages, refused or
//! garbled locks and forged echoes.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use pedalock_client::{Gateway, GatewayError};
use pedalock_core::{
    Bike, BikeEvent, BikeStatus, Coordinate, Environment, Trigger,
    session::TOKEN_DIGITS,
    wire::{
        ActivateRequest, DestroyRecord, FinishMaintenanceRequest, MaintenanceRequest,
        MalfunctionRecord, RegisterRequest, Reply, TelemetryRequest, UnlockReply, UnlockRequest,
    },
};
use pedalock_crypto::{SharedKey, decrypt_fields, encrypt_fields};
use tokio::time::Instant;

use crate::SimEnv;

/// Default flat fee charged on unlock.
pub const DEFAULT_UNLOCK_FEE: f64 = 1.0;

/// Default charge per started minute.
pub const DEFAULT_PER_MINUTE_RATE: f64 = 0.25;

/// First id handed out by registration.
const FIRST_BIKE_ID: u64 = 1000;

/// Billing and timing of the simulated backend.
#[derive(Debug, Clone)]
pub struct SimGatewayConfig {
    /// Flat fee charged on unlock
    pub unlock_fee: f64,
    /// Charge per started minute
    pub per_minute_rate: f64,
    /// Delay before each reply
    pub latency: Duration,
}

impl Default for SimGatewayConfig {
    fn default() -> Self {
        Self {
            unlock_fee: DEFAULT_UNLOCK_FEE,
            per_minute_rate: DEFAULT_PER_MINUTE_RATE,
            latency: Duration::ZERO,
        }
    }
}

/// What the backend echoes in an unlock reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoFault {
    /// Our token, as a real backend would
    #[default]
    Faithful,
    /// A well-formed envelope carrying a different token
    WrongToken,
    /// Something that is not an envelope at all
    Garbage,
}

/// Faults to inject into subsequent requests.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every request fails as unreachable
    pub unreachable: bool,
    /// Unlock replies with `ok: false`
    pub reject_unlock: bool,
    /// Unlock echo behaviour
    pub echo: EchoFault,
    /// The next N update requests fail as unreachable
    pub fail_updates: u32,
    /// The next N lock requests are refused
    pub reject_locks: u32,
    /// The next N lock requests fail as unreachable
    pub unreachable_locks: u32,
    /// The next N lock requests get an unparseable receipt and are not
    /// committed
    pub malformed_receipts: u32,
    /// Registration echoes a different series number
    pub foreign_series: bool,
}

impl FaultPlan {
    fn take_outage(&mut self, endpoint: Endpoint) -> bool {
        if self.unreachable {
            return true;
        }
        let remaining = match endpoint {
            Endpoint::Update => &mut self.fail_updates,
            Endpoint::Lock => &mut self.unreachable_locks,
            _ => return false,
        };
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }
}

/// Backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/customer/bike/unlock`
    Unlock,
    /// `/customer/bike/update`, occupied
    Update,
    /// `/customer/bike/update`, available
    Lock,
    /// `/customer/bike/report`
    Report,
    /// `/maintainer/bike/register`
    Register,
    /// `/maintainer/bike/activate`
    Activate,
    /// `/maintainer/maintain/start`
    StartMaintenance,
    /// `/maintainer/maintain/finish`
    FinishMaintenance,
    /// `/manager/bike/destroy`
    Destroy,
}

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Endpoint hit
    pub endpoint: Endpoint,
    /// Bike named in the request, when it carries one
    pub bike_id: Option<u64>,
    /// Arrival time on the tokio clock
    pub at: Instant,
}

/// Decrypted telemetry as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Reporting bike
    pub bike_id: u64,
    /// Status field
    pub status: BikeStatus,
    /// Reported mileage in kilometres
    pub mileage: f64,
    /// Reported position
    pub position: Coordinate,
}

struct OpenRide {
    token: String,
    started: Instant,
}

struct Backend {
    key: SharedKey,
    config: SimGatewayConfig,
    bikes: HashMap<u64, Bike>,
    rides: HashMap<u64, OpenRide>,
    settled: HashMap<u64, u64>,
    malfunctions: Vec<MalfunctionRecord>,
    registrations: HashMap<u64, Bike>,
    next_bike_id: u64,
    next_record_id: u64,
    faults: FaultPlan,
    exchanges: Vec<Exchange>,
    telemetry: Vec<TelemetryRecord>,
}

/// Simulated backend.
pub struct SimGateway {
    env: SimEnv,
    latency: Duration,
    state: Mutex<Backend>,
}

impl SimGateway {
    /// Backend sharing `key` with its clients.
    pub fn new(env: SimEnv, key: SharedKey, config: SimGatewayConfig) -> Self {
        let latency = config.latency;
        let backend = Backend {
            key,
            config,
            bikes: HashMap::new(),
            rides: HashMap::new(),
            settled: HashMap::new(),
            malfunctions: Vec::new(),
            registrations: HashMap::new(),
            next_bike_id: FIRST_BIKE_ID,
            next_record_id: 1,
            faults: FaultPlan::default(),
            exchanges: Vec::new(),
            telemetry: Vec::new(),
        };

        Self { env, latency, state: Mutex::new(backend) }
    }

    /// Backend with the default key and billing, seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SimEnv::with_seed(seed), SharedKey::default(), SimGatewayConfig::default())
    }

    /// Put `bike` into the backend's registry as-is.
    pub fn add_bike(&self, bike: Bike) {
        self.backend().bikes.insert(bike.id(), bike);
    }

    /// Backend view of a bike.
    pub fn bike(&self, bike_id: u64) -> Option<Bike> {
        self.backend().bikes.get(&bike_id).cloned()
    }

    /// Replace the fault plan.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.backend().faults = faults;
    }

    /// Edit the fault plan in place.
    pub fn update_faults(&self, edit: impl FnOnce(&mut FaultPlan)) {
        edit(&mut self.backend().faults);
    }

    /// All requests received so far.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.backend().exchanges.clone()
    }

    /// Requests received on `endpoint`.
    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.backend().exchanges.iter().filter(|e| e.endpoint == endpoint).count()
    }

    /// Telemetry that decrypted and matched an open ride.
    pub fn telemetry(&self) -> Vec<TelemetryRecord> {
        self.backend().telemetry.clone()
    }

    /// Malfunction reports stored so far.
    pub fn malfunctions(&self) -> Vec<MalfunctionRecord> {
        self.backend().malfunctions.clone()
    }

    /// Whether `bike_id` has an open ride.
    pub fn has_open_ride(&self, bike_id: u64) -> bool {
        self.backend().rides.contains_key(&bike_id)
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn serve<T>(
        &self,
        endpoint: Endpoint,
        bike_id: Option<u64>,
        handler: impl FnOnce(&mut Backend, &SimEnv) -> T + Send,
    ) -> Result<T, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut backend = self.backend();
        backend.exchanges.push(Exchange { endpoint, bike_id, at: Instant::now() });

        if backend.faults.take_outage(endpoint) {
            tracing::debug!(?endpoint, ?bike_id, "simulated outage");
            return Err(GatewayError::Unreachable("simulated outage".to_string()));
        }

        Ok(handler(&mut backend, &self.env))
    }
}

#[async_trait]
impl Gateway for SimGateway {
    async fn unlock(&self, request: UnlockRequest) -> Result<UnlockReply, GatewayError> {
        self.serve(Endpoint::Unlock, Some(request.bike_id), |backend, env| {
            backend.unlock(&request, env)
        })
        .await
    }

    async fn update(&self, request: TelemetryRequest) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::Update, Some(request.bike_id), |backend, _| {
            backend.telemetry(&request)
        })
        .await
    }

    async fn lock(&self, request: TelemetryRequest) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::Lock, Some(request.bike_id), |backend, _| backend.telemetry(&request))
            .await
    }

    async fn report(&self, records: Vec<MalfunctionRecord>) -> Result<Reply, GatewayError> {
        let bike_id = {
            let backend = self.backend();
            records.first().and_then(|r| backend.settled.get(&r.ride_id).copied())
        };

        self.serve(Endpoint::Report, bike_id, |backend, _| backend.report(records)).await
    }

    async fn register(&self, request: RegisterRequest) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::Register, None, |backend, env| backend.register(&request, env)).await
    }

    async fn activate(&self, request: ActivateRequest) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::Activate, None, |backend, _| backend.activate(&request)).await
    }

    async fn start_maintenance(&self, request: MaintenanceRequest) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::StartMaintenance, Some(request.bike_id), |backend, _| {
            backend.commit(request.bike_id, BikeEvent::MaintenanceStarted)
        })
        .await
    }

    async fn finish_maintenance(
        &self,
        request: FinishMaintenanceRequest,
    ) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::FinishMaintenance, Some(request.bike_id), |backend, _| {
            match (request.p_longitude.parse::<f64>(), request.p_latitude.parse::<f64>()) {
                (Ok(longitude), Ok(latitude)) => backend.commit(
                    request.bike_id,
                    BikeEvent::MaintenanceFinished {
                        position: Coordinate::new(longitude, latitude),
                    },
                ),
                _ => Reply::rejected(),
            }
        })
        .await
    }

    async fn destroy(&self, record: DestroyRecord) -> Result<Reply, GatewayError> {
        self.serve(Endpoint::Destroy, Some(record.bike_id), |backend, _| {
            backend.commit(record.bike_id, BikeEvent::Destroyed { reason: record.reason.clone() })
        })
        .await
    }
}

impl Backend {
    fn unlock(&mut self, request: &UnlockRequest, env: &SimEnv) -> UnlockReply {
        let refused = UnlockReply { ok: false, encrypted: None };

        if self.faults.reject_unlock {
            return refused;
        }

        let Ok(fields) = decrypt_fields(&request.encrypted, &self.key) else {
            tracing::warn!(bike_id = request.bike_id, "unlock payload does not open");
            return refused;
        };
        let [token, bike_id] = fields.as_slice() else {
            return refused;
        };
        if bike_id.parse::<u64>() != Ok(request.bike_id) {
            return refused;
        }

        let unlockable =
            self.bikes.get(&request.bike_id).is_some_and(|b| b.status().permits(Trigger::Unlock));
        if !unlockable {
            return refused;
        }

        // An unconfirmed ride from an earlier attempt is replaced.
        self.rides
            .insert(request.bike_id, OpenRide { token: token.clone(), started: Instant::now() });

        let echoed = match self.faults.echo {
            EchoFault::Faithful => token.clone(),
            EchoFault::WrongToken => format!(
                "{:0width$}",
                token.parse::<u64>().map_or(0, |t| t.wrapping_add(1)),
                width = TOKEN_DIGITS
            ),
            EchoFault::Garbage => {
                return UnlockReply { ok: true, encrypted: Some("not an envelope".to_string()) };
            },
        };

        match encrypt_fields(&[echoed.as_str(), bike_id.as_str()], &self.key, env.random_nonce()) {
            Ok(encrypted) => UnlockReply { ok: true, encrypted: Some(encrypted) },
            Err(_) => refused,
        }
    }

    fn telemetry(&mut self, request: &TelemetryRequest) -> Reply {
        let Ok(fields) = decrypt_fields(&request.encrypted, &self.key) else {
            tracing::warn!(bike_id = request.bike_id, "telemetry payload does not open");
            return Reply::rejected();
        };
        let [token, status, mileage, longitude, latitude] = fields.as_slice() else {
            return Reply::rejected();
        };

        let Some(started) = self
            .rides
            .get(&request.bike_id)
            .filter(|ride| ride.token == *token)
            .map(|ride| ride.started)
        else {
            tracing::warn!(bike_id = request.bike_id, "telemetry without a matching ride");
            return Reply::rejected();
        };

        let parsed = (
            status.parse::<u8>().ok().and_then(BikeStatus::from_code),
            mileage.parse::<f64>(),
            longitude.parse::<f64>(),
            latitude.parse::<f64>(),
        );
        let (Some(status), Ok(mileage), Ok(longitude), Ok(latitude)) = parsed else {
            return Reply::rejected();
        };

        let position = Coordinate::new(longitude, latitude);
        self.telemetry.push(TelemetryRecord { bike_id: request.bike_id, status, mileage, position });

        let elapsed = started.elapsed();
        let Some(bike) = self.bikes.get_mut(&request.bike_id) else {
            return Reply::rejected();
        };

        match status {
            BikeStatus::Occupied => {
                // First occupied update confirms the unlock.
                if bike.status() == BikeStatus::Available && bike.apply(BikeEvent::Unlocked).is_err()
                {
                    return Reply::rejected();
                }
                Reply::accepted(format!(
                    "{},{}",
                    format_elapsed(elapsed),
                    self.charge(elapsed)
                ))
            },
            BikeStatus::Available => {
                if self.faults.reject_locks > 0 {
                    self.faults.reject_locks -= 1;
                    return Reply::rejected();
                }
                if self.faults.malformed_receipts > 0 {
                    self.faults.malformed_receipts -= 1;
                    return Reply::accepted(format_elapsed(elapsed));
                }
                if bike.apply(BikeEvent::Locked { position }).is_err() {
                    return Reply::rejected();
                }

                self.rides.remove(&request.bike_id);
                let record_id = self.next_record_id;
                self.next_record_id += 1;
                self.settled.insert(record_id, request.bike_id);

                Reply::accepted(format!(
                    "{},{},{}",
                    format_elapsed(elapsed),
                    self.charge(elapsed),
                    record_id
                ))
            },
            BikeStatus::Unavailable | BikeStatus::Destroyed => Reply::rejected(),
        }
    }

    fn report(&mut self, records: Vec<MalfunctionRecord>) -> Reply {
        let valid = !records.is_empty()
            && records.iter().all(|r| {
                self.settled.contains_key(&r.ride_id) && r.severity().is_some()
            });
        if !valid {
            tracing::warn!(records = records.len(), "malfunction report refused");
            return Reply::rejected();
        }

        let stored = records.len();
        self.malfunctions.extend(records);
        Reply::accepted(stored.to_string())
    }

    fn register(&mut self, request: &RegisterRequest, env: &SimEnv) -> Reply {
        let Ok(fields) = decrypt_fields(&request.encrypted, &self.key) else {
            return Reply::rejected();
        };
        let [series_number, longitude, latitude] = fields.as_slice() else {
            return Reply::rejected();
        };
        let (Ok(longitude), Ok(latitude)) = (longitude.parse::<f64>(), latitude.parse::<f64>())
        else {
            return Reply::rejected();
        };

        let bike_id = self.next_bike_id;
        self.next_bike_id += 1;
        self.registrations.insert(
            bike_id,
            Bike::new(bike_id, series_number.clone(), Coordinate::new(longitude, latitude)),
        );

        let echoed =
            if self.faults.foreign_series { format!("{series_number}-X") } else { series_number.clone() };
        let id = bike_id.to_string();

        match encrypt_fields(&[echoed.as_str(), id.as_str()], &self.key, env.random_nonce()) {
            Ok(encrypted) => Reply::accepted(encrypted),
            Err(_) => Reply::rejected(),
        }
    }

    fn activate(&mut self, request: &ActivateRequest) -> Reply {
        let Ok(fields) = decrypt_fields(&request.encrypted, &self.key) else {
            return Reply::rejected();
        };
        let [bike_id] = fields.as_slice() else {
            return Reply::rejected();
        };
        let Some(bike) = bike_id.parse::<u64>().ok().and_then(|id| self.registrations.remove(&id)) else {
            return Reply::rejected();
        };

        tracing::debug!(bike_id = bike.id(), "bike activated");
        self.bikes.insert(bike.id(), bike);
        Reply::ack()
    }

    fn commit(&mut self, bike_id: u64, event: BikeEvent) -> Reply {
        match self.bikes.get_mut(&bike_id).map(|bike| bike.apply(event)) {
            Some(Ok(_)) => Reply::ack(),
            _ => Reply::rejected(),
        }
    }

    fn charge(&self, elapsed: Duration) -> String {
        let minutes = elapsed.as_secs().div_ceil(60);
        format!("{:.2}", self.config.unlock_fee + self.config.per_minute_rate * minutes as f64)
    }
}

/// Render `elapsed` as `HH:MM:SS`.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_clock_style() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn outage_counts_down_per_endpoint() {
        let mut faults = FaultPlan { fail_updates: 1, ..FaultPlan::default() };

        assert!(!faults.take_outage(Endpoint::Lock));
        assert!(faults.take_outage(Endpoint::Update));
        assert!(!faults.take_outage(Endpoint::Update));

        faults.unreachable_locks = 2;
        assert!(!faults.take_outage(Endpoint::Update));
        assert!(!faults.take_outage(Endpoint::Unlock));
        assert!(faults.take_outage(Endpoint::Lock));
        assert!(faults.take_outage(Endpoint::Lock));
        assert!(!faults.take_outage(Endpoint::Lock));
    }
}
