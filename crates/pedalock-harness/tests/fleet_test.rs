//! Provisioning, maintenance and destruction through the simulated backend.

use std::sync::Arc;

use pedalock_client::{Fleet, FleetError, GatewayError, RideError, SystemEnv};
use pedalock_core::{BikeStatus, Coordinate, SessionError, TransitionError, Trigger};
use pedalock_crypto::SharedKey;
use pedalock_harness::{Endpoint, FaultPlan, SimEnv, SimGateway};

const DEPOT: Coordinate = Coordinate::new(120.1, 30.2);
const LIBRARY: Coordinate = Coordinate::new(120.105, 30.204);

fn fleet(seed: u64) -> (Arc<SimGateway>, Fleet<SimGateway, SimEnv>) {
    let gateway = Arc::new(SimGateway::with_seed(seed));
    let fleet = Fleet::new(Arc::clone(&gateway), SimEnv::with_seed(seed + 100), SharedKey::default());
    (gateway, fleet)
}

#[tokio::test]
async fn register_yields_available_bike_at_site() {
    let (gateway, fleet) = fleet(1);

    let bike = fleet.register(3, "SN-42", DEPOT).await.unwrap();

    assert_eq!(bike.id(), 1000);
    assert_eq!(bike.series_number(), "SN-42");
    assert_eq!(bike.status(), BikeStatus::Available);
    assert_eq!(bike.position(), DEPOT);

    let backend = gateway.bike(bike.id()).unwrap();
    assert_eq!(backend.status(), BikeStatus::Available);
    assert_eq!(backend.series_number(), "SN-42");

    let second = fleet.register(3, "SN-43", DEPOT).await.unwrap();
    assert_eq!(second.id(), 1001);
}

#[tokio::test]
async fn foreign_series_echo_aborts_provisioning() {
    let (gateway, fleet) = fleet(2);
    gateway.set_faults(FaultPlan { foreign_series: true, ..FaultPlan::default() });

    let err = fleet.register(3, "SN-42", DEPOT).await.unwrap_err();

    assert_eq!(err, FleetError::Session(SessionError::AuthenticationMismatch {
        field: "series_number"
    }));
    assert!(err.is_authentication_failure());
    assert_eq!(gateway.count(Endpoint::Activate), 0);
    assert!(gateway.bike(1000).is_none());
}

#[tokio::test]
async fn mismatched_keys_cannot_provision() {
    let gateway = Arc::new(SimGateway::with_seed(3));
    let fleet =
        Fleet::new(Arc::clone(&gateway), SystemEnv::new(), SharedKey::from_passphrase(b"trike"));

    let err = fleet.register(3, "SN-42", DEPOT).await.unwrap_err();

    assert_eq!(err, FleetError::Rejected { operation: "register" });
}

#[tokio::test]
async fn maintenance_round_trip_moves_bike() {
    let (gateway, fleet) = fleet(4);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();

    fleet.start_maintenance(&mut bike).await.unwrap();
    assert_eq!(bike.status(), BikeStatus::Unavailable);
    assert_eq!(gateway.bike(bike.id()).unwrap().status(), BikeStatus::Unavailable);

    // A bike in maintenance cannot be ridden.
    let err = fleet.start_ride(&mut bike, DEPOT).await.err().unwrap();
    assert!(matches!(err, RideError::Transition(_)));
    assert_eq!(gateway.count(Endpoint::Unlock), 0);

    fleet.finish_maintenance(&mut bike, LIBRARY).await.unwrap();
    assert_eq!(bike.status(), BikeStatus::Available);
    assert_eq!(bike.position(), LIBRARY);

    let backend = gateway.bike(bike.id()).unwrap();
    assert_eq!(backend.status(), BikeStatus::Available);
    assert_eq!(backend.position(), LIBRARY);
}

#[tokio::test]
async fn finish_requires_maintenance() {
    let (gateway, fleet) = fleet(5);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();
    let before = bike.clone();

    let err = fleet.finish_maintenance(&mut bike, LIBRARY).await.unwrap_err();

    assert_eq!(
        err,
        FleetError::Transition(TransitionError::Illegal {
            from: BikeStatus::Available,
            trigger: Trigger::FinishMaintenance,
        })
    );
    assert_eq!(bike, before);
    assert_eq!(gateway.count(Endpoint::FinishMaintenance), 0);
}

#[tokio::test]
async fn destroyed_bike_is_terminal() {
    let (gateway, fleet) = fleet(6);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();

    let record = fleet.destroy(&mut bike, "frame cracked").await.unwrap();
    assert_eq!(record.bike_id, bike.id());
    assert_eq!(record.reason, "frame cracked");
    assert_eq!(bike.status(), BikeStatus::Destroyed);
    assert_eq!(gateway.bike(bike.id()).unwrap().status(), BikeStatus::Destroyed);

    assert!(matches!(fleet.destroy(&mut bike, "again").await, Err(FleetError::Transition(_))));
    assert!(matches!(fleet.start_maintenance(&mut bike).await, Err(FleetError::Transition(_))));
    assert!(matches!(fleet.start_ride(&mut bike, DEPOT).await, Err(RideError::Transition(_))));

    assert_eq!(gateway.count(Endpoint::Destroy), 1);
    assert_eq!(gateway.count(Endpoint::StartMaintenance), 0);
    assert_eq!(gateway.count(Endpoint::Unlock), 0);
}

#[tokio::test]
async fn bikes_under_maintenance_can_be_destroyed() {
    let (_, fleet) = fleet(7);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();

    fleet.start_maintenance(&mut bike).await.unwrap();
    fleet.destroy(&mut bike, "beyond repair").await.unwrap();

    assert_eq!(bike.status(), BikeStatus::Destroyed);
}

#[tokio::test]
async fn occupied_bike_cannot_be_destroyed() {
    let (gateway, fleet) = fleet(8);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();
    let _ride = fleet.start_ride(&mut bike, DEPOT).await.unwrap();

    let err = fleet.destroy(&mut bike, "stolen").await.unwrap_err();

    assert!(matches!(
        err,
        FleetError::Transition(TransitionError::Illegal { from: BikeStatus::Occupied, .. })
    ));
    assert_eq!(gateway.count(Endpoint::Destroy), 0);
}

#[tokio::test]
async fn backend_refusal_leaves_bike_unchanged() {
    let (gateway, fleet) = fleet(9);
    // Never registered with the backend, so every request is refused.
    let mut bike = pedalock_core::Bike::new(55, "SN-55", DEPOT);

    let err = fleet.start_maintenance(&mut bike).await.unwrap_err();

    assert_eq!(err, FleetError::Rejected { operation: "start_maintenance" });
    assert!(err.is_transient());
    assert_eq!(bike.status(), BikeStatus::Available);
    assert_eq!(gateway.count(Endpoint::StartMaintenance), 1);
}

#[tokio::test]
async fn outage_is_transient() {
    let (gateway, fleet) = fleet(10);
    let mut bike = fleet.register(1, "SN-1", DEPOT).await.unwrap();
    gateway.set_faults(FaultPlan { unreachable: true, ..FaultPlan::default() });

    let err = fleet.start_maintenance(&mut bike).await.unwrap_err();

    assert!(matches!(err, FleetError::Gateway(GatewayError::Unreachable(_))));
    assert!(err.is_transient());
    assert_eq!(bike.status(), BikeStatus::Available);
}
