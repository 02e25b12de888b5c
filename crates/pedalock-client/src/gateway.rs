//! Backend gateway abstraction.
//!
//! One method per HTTP exchange. Implementations own the transport; the ride
//! and fleet drivers only see request and reply bodies. Transport failures
//! surface as [`GatewayError`]; an explicit refusal is a reply with
//! `ok: false`.

use std::time::Duration;

use async_trait::async_trait;
use pedalock_core::wire::{
    ActivateRequest, DestroyRecord, FinishMaintenanceRequest, MaintenanceRequest,
    MalfunctionRecord, RegisterRequest, Reply, TelemetryRequest, UnlockReply, UnlockRequest,
};
use thiserror::Error;

/// Transport-level gateway failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Request never reached the backend, or the reply was lost
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// Backend did not answer in time
    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),
}

/// Backend endpoints used by riders, maintainers and managers.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// `/customer/bike/unlock`
    async fn unlock(&self, request: UnlockRequest) -> Result<UnlockReply, GatewayError>;

    /// `/customer/bike/update` with status occupied
    async fn update(&self, request: TelemetryRequest) -> Result<Reply, GatewayError>;

    /// `/customer/bike/update` with status available
    async fn lock(&self, request: TelemetryRequest) -> Result<Reply, GatewayError>;

    /// `/customer/bike/report`
    async fn report(&self, records: Vec<MalfunctionRecord>) -> Result<Reply, GatewayError>;

    /// `/maintainer/bike/register`
    async fn register(&self, request: RegisterRequest) -> Result<Reply, GatewayError>;

    /// `/maintainer/bike/activate`
    async fn activate(&self, request: ActivateRequest) -> Result<Reply, GatewayError>;

    /// `/maintainer/maintain/start`
    async fn start_maintenance(&self, request: MaintenanceRequest) -> Result<Reply, GatewayError>;

    /// `/maintainer/maintain/finish`
    async fn finish_maintenance(
        &self,
        request: FinishMaintenanceRequest,
    ) -> Result<Reply, GatewayError>;

    /// `/manager/bike/destroy`
    async fn destroy(&self, record: DestroyRecord) -> Result<Reply, GatewayError>;
}
