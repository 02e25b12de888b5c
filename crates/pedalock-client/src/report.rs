//! Post-ride malfunction reports.
//!
//! A rider may report broken parts after locking. Every record carries the
//! `record_id` from the [`LockReceipt`], so the backend can attach it to the
//! ride that found the fault. Reports travel in plain text; the ride token is
//! already gone by then.

use pedalock_core::{
    WireError,
    wire::{LockReceipt, MalfunctionRecord, Severity},
};

use crate::{error::RideError, gateway::Gateway, ride::expect_data};

/// Malfunctions collected for one finished ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalfunctionReport {
    receipt: LockReceipt,
    records: Vec<MalfunctionRecord>,
}

impl MalfunctionReport {
    /// Empty report for the ride settled by `receipt`.
    pub fn for_ride(receipt: &LockReceipt) -> Self {
        Self { receipt: receipt.clone(), records: Vec::new() }
    }

    /// Add one malfunctioning part.
    pub fn add(
        &mut self,
        malfunction_id: u64,
        severity: Severity,
        description: impl Into<String>,
    ) -> &mut Self {
        self.records.push(MalfunctionRecord::new(
            &self.receipt,
            malfunction_id,
            severity,
            description,
        ));
        self
    }

    /// Ride the report is attached to.
    #[must_use]
    pub fn ride_id(&self) -> u64 {
        self.receipt.record_id
    }

    /// Records collected so far.
    #[must_use]
    pub fn records(&self) -> &[MalfunctionRecord] {
        &self.records
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Send the report and return how many records the backend stored.
    ///
    /// An empty report is not sent.
    ///
    /// # Errors
    ///
    /// - `RideError::Gateway` / `RideError::Rejected` if the exchange fails
    /// - `RideError::Malformed` if the reply does not carry a record count
    pub async fn submit<G: Gateway>(self, gateway: &G) -> Result<usize, RideError> {
        if self.records.is_empty() {
            return Ok(0);
        }

        let ride_id = self.ride_id();
        let data = expect_data(gateway.report(self.records).await, "report")?;
        let stored = data
            .trim()
            .parse::<usize>()
            .map_err(|_| WireError::MalformedData { operation: "report", data: data.clone() })?;

        tracing::info!(ride_id, stored, "malfunctions reported");

        Ok(stored)
    }
}
