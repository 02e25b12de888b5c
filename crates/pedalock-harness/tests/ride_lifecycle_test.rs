//! Ride driver against the simulated backend.
//!
//! Covers the unlock handshake, the confirm update, telemetry, the lock and
//! post-ride malfunction reports, including every failure path that must
//! leave the bike untouched.

use std::{sync::Arc, time::Duration};

use pedalock_client::{GatewayError, MalfunctionReport, Ride, RideError, Severity};
use pedalock_core::{
    Bike, BikeStatus, Coordinate, SessionError, SessionState, TransitionError, WireError,
    distance_km,
    wire::{LockReceipt, format_mileage},
};
use pedalock_crypto::SharedKey;
use pedalock_harness::{
    EchoFault, Endpoint, FaultPlan, SimEnv, SimGateway, SimGatewayConfig, scenario::step_north,
};

const ORIGIN: Coordinate = Coordinate::new(120.0, 30.0);
const BIKE_ID: u64 = 7;

fn fixture(seed: u64) -> (Arc<SimGateway>, SimEnv, Bike) {
    let env = SimEnv::with_seed(seed);
    let gateway =
        Arc::new(SimGateway::new(env.clone(), SharedKey::default(), SimGatewayConfig::default()));
    let bike = Bike::new(BIKE_ID, "SN-7", ORIGIN);
    gateway.add_bike(bike.clone());

    (gateway, env, bike)
}

async fn unlock(
    gateway: &Arc<SimGateway>,
    env: &SimEnv,
    bike: &mut Bike,
) -> Result<Ride<SimGateway, SimEnv>, RideError> {
    Ride::unlock(Arc::clone(gateway), env.clone(), SharedKey::default(), bike, ORIGIN).await
}

#[tokio::test(start_paused = true)]
async fn unlock_three_updates_lock() {
    let (gateway, env, mut bike) = fixture(1);

    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    assert_eq!(bike.status(), BikeStatus::Occupied);
    assert_eq!(gateway.bike(BIKE_ID).unwrap().status(), BikeStatus::Occupied);
    assert_eq!(ride.state(), SessionState::Active);
    assert_eq!(gateway.count(Endpoint::Update), 1, "confirm update");

    let mut position = ORIGIN;
    let mut last_mileage = ride.mileage();
    for _ in 0..3 {
        position = step_north(position, 200.0);
        let progress = ride.update(position).await.unwrap();

        assert!(ride.mileage() > last_mileage);
        assert_eq!(progress.charge, "1.00");
        last_mileage = ride.mileage();
    }

    let receipt = ride.lock(&mut bike).await.unwrap();
    assert_eq!(receipt.record_id, 1);
    assert_eq!(bike.status(), BikeStatus::Available);
    assert_eq!(bike.position(), position);
    assert_eq!(ride.state(), SessionState::Closed);
    assert!(ride.session().token().is_none());

    let backend = gateway.bike(BIKE_ID).unwrap();
    assert_eq!(backend.status(), BikeStatus::Available);
    assert_eq!(backend.position(), position);
    assert!(!gateway.has_open_ride(BIKE_ID));

    assert_eq!(gateway.count(Endpoint::Update), 4);
    assert_eq!(gateway.count(Endpoint::Lock), 1);

    // Nothing reaches the backend once the ride is closed.
    let sent = gateway.exchanges().len();
    assert!(matches!(
        ride.update(step_north(position, 50.0)).await,
        Err(RideError::Session(SessionError::InvalidState { state: SessionState::Closed, .. }))
    ));
    assert!(matches!(ride.lock(&mut bike).await, Err(RideError::Transition(_))));
    assert_eq!(gateway.exchanges().len(), sent);
}

#[tokio::test]
async fn backend_sees_formatted_mileage() {
    let (gateway, env, mut bike) = fixture(2);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();

    ride.update(step_north(ORIGIN, 1230.0)).await.unwrap();

    let last = gateway.telemetry().pop().unwrap();
    assert_eq!(last.status, BikeStatus::Occupied);
    assert_eq!(format_mileage(last.mileage), format_mileage(ride.mileage()));
    assert!((last.mileage - 1.23).abs() < 1e-9);
}

#[tokio::test]
async fn mismatched_token_leaves_bike_unchanged() {
    let (gateway, env, mut bike) = fixture(3);
    gateway.set_faults(FaultPlan { echo: EchoFault::WrongToken, ..FaultPlan::default() });
    let before = bike.clone();

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert!(err.is_authentication_failure());
    assert!(matches!(
        err,
        RideError::Session(SessionError::AuthenticationMismatch { field: "token" })
    ));
    assert_eq!(bike, before);
    assert_eq!(gateway.bike(BIKE_ID).unwrap().status(), BikeStatus::Available);
    assert_eq!(gateway.count(Endpoint::Update), 0);
}

#[tokio::test]
async fn undecryptable_echo_leaves_bike_unchanged() {
    let (gateway, env, mut bike) = fixture(4);
    gateway.set_faults(FaultPlan { echo: EchoFault::Garbage, ..FaultPlan::default() });

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert!(matches!(err, RideError::Session(SessionError::Decryption(_))));
    assert!(err.is_authentication_failure());
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn refused_unlock_is_reported() {
    let (gateway, env, mut bike) = fixture(5);
    gateway.set_faults(FaultPlan { reject_unlock: true, ..FaultPlan::default() });

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert_eq!(err, RideError::Rejected { operation: "unlock" });
    assert!(err.is_transient());
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn unreachable_gateway_fails_unlock() {
    let (gateway, env, mut bike) = fixture(6);
    gateway.set_faults(FaultPlan { unreachable: true, ..FaultPlan::default() });

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert!(matches!(err, RideError::Gateway(_)));
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn occupied_bike_is_rejected_before_any_request() {
    let (gateway, env, _) = fixture(7);
    let mut bike = Bike::with_status(BIKE_ID, "SN-7", BikeStatus::Occupied, ORIGIN);

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert_eq!(
        err,
        RideError::Transition(TransitionError::Illegal {
            from: BikeStatus::Occupied,
            trigger: pedalock_core::Trigger::Unlock,
        })
    );
    assert!(gateway.exchanges().is_empty());
}

#[tokio::test]
async fn failed_confirm_leaves_bike_available() {
    let (gateway, env, mut bike) = fixture(8);
    gateway.set_faults(FaultPlan { fail_updates: 1, ..FaultPlan::default() });

    let err = unlock(&gateway, &env, &mut bike).await.err().unwrap();

    assert!(matches!(err, RideError::ConfirmFailed(_)));
    assert!(err.is_transient());
    assert_eq!(bike.status(), BikeStatus::Available);
    assert_eq!(gateway.bike(BIKE_ID).unwrap().status(), BikeStatus::Available);

    // The bike can be unlocked again once the backend recovers.
    let ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    assert_eq!(ride.state(), SessionState::Active);
    assert_eq!(bike.status(), BikeStatus::Occupied);
}

#[tokio::test]
async fn rejected_lock_keeps_ride_active() {
    let (gateway, env, mut bike) = fixture(9);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    gateway.set_faults(FaultPlan { reject_locks: 1, ..FaultPlan::default() });

    let err = ride.lock(&mut bike).await.err().unwrap();

    assert_eq!(err, RideError::Rejected { operation: "lock" });
    assert_eq!(bike.status(), BikeStatus::Occupied);
    assert_eq!(ride.state(), SessionState::Active);
    assert!(ride.session().token().is_some());

    // Telemetry keeps flowing and the retry succeeds.
    ride.update(step_north(ORIGIN, 10.0)).await.unwrap();
    ride.lock(&mut bike).await.unwrap();
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn lock_requires_the_unlocked_bike() {
    let (gateway, env, mut bike) = fixture(10);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    let mut other = Bike::with_status(99, "SN-99", BikeStatus::Occupied, ORIGIN);

    let err = ride.lock(&mut other).await.err().unwrap();

    assert_eq!(err, RideError::WrongBike { expected: BIKE_ID, actual: 99 });
    assert_eq!(gateway.count(Endpoint::Lock), 0);
}

#[tokio::test]
async fn failed_update_does_not_roll_back_mileage() {
    let (gateway, env, mut bike) = fixture(11);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();

    let p1 = step_north(ORIGIN, 300.0);
    let p2 = step_north(p1, 300.0);

    gateway.set_faults(FaultPlan { fail_updates: 1, ..FaultPlan::default() });
    let err = ride.update(p1).await.err().unwrap();
    assert!(matches!(err, RideError::Gateway(_)));
    assert_eq!(ride.mileage(), distance_km(ORIGIN, p1));
    assert_eq!(ride.state(), SessionState::Active);

    ride.update(p2).await.unwrap();
    assert_eq!(ride.mileage(), distance_km(ORIGIN, p1) + distance_km(p1, p2));
}

#[tokio::test]
async fn repeated_fix_adds_nothing_then_one_kilometre() {
    let (gateway, env, mut bike) = fixture(12);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();

    ride.update(ORIGIN).await.unwrap();
    assert_eq!(ride.mileage(), 0.0);

    ride.update(Coordinate::new(120.0, 30.009)).await.unwrap();
    assert!((ride.mileage() - 1.0).abs() < 0.01, "mileage {}", ride.mileage());
}

#[tokio::test(start_paused = true)]
async fn progress_tracks_backend_clock() {
    let (gateway, env, mut bike) = fixture(13);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();

    tokio::time::advance(Duration::from_secs(90)).await;
    let progress = ride.update(ORIGIN).await.unwrap();

    assert_eq!(progress.elapsed_time, "00:01:30");
    assert_eq!(progress.charge, "1.50");
    assert_eq!(ride.progress(), Some(&progress));

    tokio::time::advance(Duration::from_secs(3_600)).await;
    let receipt = ride.lock(&mut bike).await.unwrap();

    assert_eq!(receipt.elapsed_time, "01:01:30");
    assert_eq!(receipt.charge, "16.50");
}

#[tokio::test]
async fn closed_ride_records_no_further_distance() {
    let (gateway, env, mut bike) = fixture(14);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    assert_eq!(ride.session().series_number(), "SN-7");
    ride.lock(&mut bike).await.unwrap();

    let err = ride.update(step_north(ORIGIN, 5_000.0)).await.err().unwrap();

    assert_eq!(
        err,
        RideError::Session(SessionError::InvalidState {
            state: SessionState::Closed,
            operation: "update",
        })
    );
    assert_eq!(ride.mileage(), 0.0);
    assert_eq!(ride.position(), Some(ORIGIN));
}

#[tokio::test]
async fn non_finite_fix_never_reaches_the_backend() {
    let (gateway, env, mut bike) = fixture(15);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    let sent = gateway.exchanges().len();

    let err = ride.update(Coordinate::new(f64::NAN, 30.0)).await.err().unwrap();

    assert_eq!(err, RideError::Session(SessionError::NonFiniteFix));
    assert!(!err.is_transient());
    assert_eq!(gateway.exchanges().len(), sent);
    assert_eq!(ride.position(), Some(ORIGIN));

    let next = step_north(ORIGIN, 400.0);
    ride.update(next).await.unwrap();
    assert_eq!(ride.mileage(), distance_km(ORIGIN, next));

    ride.lock(&mut bike).await.unwrap();
    let settled = gateway.telemetry().pop().unwrap();
    assert!(settled.mileage.is_finite());
    assert_eq!(format_mileage(settled.mileage), format_mileage(ride.mileage()));
}

#[tokio::test]
async fn non_finite_origin_cannot_unlock() {
    let (gateway, env, mut bike) = fixture(16);

    let err = Ride::unlock(
        Arc::clone(&gateway),
        env.clone(),
        SharedKey::default(),
        &mut bike,
        Coordinate::new(120.0, f64::INFINITY),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err, RideError::Session(SessionError::NonFiniteFix));
    assert_eq!(bike.status(), BikeStatus::Available);
    assert!(gateway.exchanges().is_empty());
}

#[tokio::test]
async fn lock_lost_in_transit_keeps_ride_active() {
    let (gateway, env, mut bike) = fixture(17);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    gateway.set_faults(FaultPlan { unreachable_locks: 1, ..FaultPlan::default() });

    let err = ride.lock(&mut bike).await.err().unwrap();

    assert!(matches!(err, RideError::Gateway(GatewayError::Unreachable(_))));
    assert!(err.is_transient());
    assert_eq!(bike.status(), BikeStatus::Occupied);
    assert_eq!(ride.state(), SessionState::Active);
    assert!(gateway.has_open_ride(BIKE_ID));

    ride.lock(&mut bike).await.unwrap();
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn unparseable_receipt_counts_as_failed_lock() {
    let (gateway, env, mut bike) = fixture(18);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    gateway.update_faults(|faults| faults.malformed_receipts = 1);

    let err = ride.lock(&mut bike).await.err().unwrap();

    assert!(matches!(
        err,
        RideError::Malformed(WireError::MalformedData { operation: "lock", .. })
    ));
    assert_eq!(bike.status(), BikeStatus::Occupied);
    assert_eq!(ride.state(), SessionState::Active);
    assert!(ride.session().token().is_some());
    assert_eq!(gateway.bike(BIKE_ID).unwrap().status(), BikeStatus::Occupied);

    let receipt = ride.lock(&mut bike).await.unwrap();
    assert_eq!(receipt.record_id, 1);
    assert_eq!(bike.status(), BikeStatus::Available);
}

#[tokio::test]
async fn malfunctions_are_reported_against_the_ride() {
    let (gateway, env, mut bike) = fixture(19);
    let mut ride = unlock(&gateway, &env, &mut bike).await.unwrap();
    let receipt = ride.lock(&mut bike).await.unwrap();

    let mut report = MalfunctionReport::for_ride(&receipt);
    report.add(3, Severity::Moderate, "saddle loose").add(7, Severity::SafetyHazard, "no brakes");

    let stored = report.submit(gateway.as_ref()).await.unwrap();

    assert_eq!(stored, 2);
    let records = gateway.malfunctions();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ride_id == receipt.record_id));
    assert_eq!(records[1].severity(), Some(Severity::SafetyHazard));

    let exchange = gateway.exchanges().pop().unwrap();
    assert_eq!(exchange.endpoint, Endpoint::Report);
    assert_eq!(exchange.bike_id, Some(BIKE_ID));
}

#[tokio::test]
async fn report_for_unknown_ride_is_refused() {
    let (gateway, _, _) = fixture(20);
    let receipt = LockReceipt::parse("00:01:00,1.25,404").unwrap();

    let mut report = MalfunctionReport::for_ride(&receipt);
    report.add(1, Severity::Minor, "bell");
    let err = report.submit(gateway.as_ref()).await.unwrap_err();

    assert_eq!(err, RideError::Rejected { operation: "report" });
    assert!(gateway.malfunctions().is_empty());

    // Empty reports are not sent at all.
    let stored = MalfunctionReport::for_ride(&receipt).submit(gateway.as_ref()).await.unwrap();
    assert_eq!(stored, 0);
    assert_eq!(gateway.count(Endpoint::Report), 1);
}
