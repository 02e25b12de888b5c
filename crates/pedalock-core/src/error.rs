//! Error types for the Pedalock protocol core.
//!
//! Strongly-typed errors for each layer: session errors (handshake,
//! authentication, state transitions), bike lifecycle errors, and malformed
//! gateway data.

use pedalock_crypto::CipherError;
use thiserror::Error;

use crate::{
    bike::{BikeStatus, Trigger},
    session::SessionState,
};

/// Errors raised by the session engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not allowed in the current session state
    #[error("invalid session state: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Envelope could not be built or opened
    #[error("cipher error: {0}")]
    Decryption(#[from] CipherError),

    /// Decrypted echo does not carry our token or series number
    #[error("authentication mismatch: peer echoed a different {field}")]
    AuthenticationMismatch {
        /// Which field failed to match
        field: &'static str,
    },

    /// Decrypted message has the wrong number of fields
    #[error("expected {expected} fields, got {actual}")]
    FieldCount {
        /// Fields the message shape requires
        expected: usize,
        /// Fields actually present
        actual: usize,
    },

    /// Decrypted field could not be parsed
    #[error("malformed field {field}: {value:?}")]
    MalformedField {
        /// Field name
        field: &'static str,
        /// Raw value
        value: String,
    },

    /// Telemetry requested before any GPS fix
    #[error("no position fix recorded")]
    MissingPosition,

    /// GPS fix with a NaN or infinite coordinate
    #[error("non-finite position fix")]
    NonFiniteFix,
}

impl SessionError {
    /// Returns true if the peer cannot be trusted for this exchange.
    ///
    /// Decryption failures, mismatched echoes and malformed plaintexts all
    /// mean the same thing to the caller: the reply did not come from a
    /// gateway that saw our request.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_)
                | Self::AuthenticationMismatch { .. }
                | Self::FieldCount { .. }
                | Self::MalformedField { .. }
        )
    }
}

/// Bike lifecycle errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// `trigger` is not legal from `from`
    #[error("illegal transition: cannot {trigger:?} a bike that is {from:?}")]
    Illegal {
        /// Status when the trigger was requested
        from: BikeStatus,
        /// Requested trigger
        trigger: Trigger,
    },
}

/// Malformed plain-text `data` in a gateway reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Reply `data` is missing although `ok` was set
    #[error("reply to {operation} carries no data")]
    MissingData {
        /// Exchange that produced the reply
        operation: &'static str,
    },

    /// Reply `data` has the wrong shape
    #[error("malformed {operation} data: {data:?}")]
    MalformedData {
        /// Exchange that produced the reply
        operation: &'static str,
        /// Raw data string
        data: String,
    },
}
