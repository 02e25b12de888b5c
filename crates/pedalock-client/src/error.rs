//! Error types for ride and fleet drivers.

use pedalock_core::{SessionError, TransitionError, WireError};
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors from a ride (unlock, update, lock).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RideError {
    /// Session engine refused or could not authenticate the exchange
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Bike is not in a state that allows the operation
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Transport failure
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Gateway answered `ok: false`
    #[error("gateway rejected {operation}")]
    Rejected {
        /// Exchange that was refused
        operation: &'static str,
    },

    /// Reply `data` could not be parsed
    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),

    /// Handshake succeeded but the occupancy confirm did not
    #[error("unlock confirm failed: {0}")]
    ConfirmFailed(Box<RideError>),

    /// Lock requested for a bike this ride does not drive
    #[error("ride drives bike {expected}, not {actual}")]
    WrongBike {
        /// Bike bound to the session
        expected: u64,
        /// Bike passed in
        actual: u64,
    },

    /// Ride task is no longer running
    #[error("ride task has stopped")]
    Stopped,
}

impl RideError {
    /// Returns true if the gateway reply could not be trusted.
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            Self::Session(e) => e.is_authentication_failure(),
            Self::ConfirmFailed(inner) => inner.is_authentication_failure(),
            _ => false,
        }
    }

    /// Returns true if retrying the same operation may succeed.
    ///
    /// Transport failures and refusals are transient; local misuse and
    /// untrusted replies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Gateway(_) | Self::Rejected { .. } | Self::Malformed(_) => true,
            Self::ConfirmFailed(inner) => inner.is_transient(),
            Self::Session(_) | Self::Transition(_) | Self::WrongBike { .. } | Self::Stopped => {
                false
            },
        }
    }
}

/// Errors from maintainer and manager operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    /// Provisioning handshake failed
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Lifecycle forbids the operation
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Transport failure
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Gateway answered `ok: false`
    #[error("gateway rejected {operation}")]
    Rejected {
        /// Exchange that was refused
        operation: &'static str,
    },

    /// Reply `data` missing or malformed
    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),
}

impl FleetError {
    /// Returns true if the gateway reply could not be trusted.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_authentication_failure())
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Rejected { .. })
    }
}
