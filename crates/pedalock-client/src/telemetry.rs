//! Telemetry actor.
//!
//! [`spawn_ride`] moves an unlocked [`Ride`] and its [`Bike`] into one tokio
//! task. The task sends an update on every tick of
//! [`RideConfig::update_interval`] using the latest GPS fix, and serves lock
//! requests from the [`RideHandle`].
//!
//! # Lifetime
//!
//! The loop exits when a lock succeeds, when the ride is cancelled, or when
//! the handle is dropped. Once it exits no further gateway calls are made and
//! the bike is handed back through [`RideHandle::join`].
//!
//! Each update is awaited before the next tick is observed, so a ride never
//! has more than one request in flight.

use std::time::Duration;

use pedalock_core::{
    Bike, Coordinate, Environment, SessionState,
    wire::{LockReceipt, RideProgress},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{error::RideError, gateway::Gateway, ride::Ride};

/// Default period between telemetry updates.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 8;

/// Ride actor configuration.
#[derive(Debug, Clone, Copy)]
pub struct RideConfig {
    /// Period between telemetry updates
    pub update_interval: Duration,
    /// Capacity of the command channel
    pub command_buffer: usize,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self { update_interval: DEFAULT_UPDATE_INTERVAL, command_buffer: DEFAULT_COMMAND_BUFFER }
    }
}

/// Point-in-time view of a running ride.
#[derive(Debug, Clone, PartialEq)]
pub struct RideSnapshot {
    /// Session state
    pub state: SessionState,
    /// Kilometres ridden
    pub mileage: f64,
    /// Last recorded fix
    pub position: Option<Coordinate>,
    /// Progress from the last accepted update
    pub progress: Option<RideProgress>,
    /// Updates accepted since the ride was spawned
    pub accepted_updates: u64,
    /// Updates that failed since the ride was spawned
    pub failed_updates: u64,
}

enum RideCommand {
    Lock { reply: oneshot::Sender<Result<LockReceipt, RideError>> },
    Cancel,
}

/// Handle to a spawned ride.
///
/// Dropping the handle stops telemetry without locking the bike.
pub struct RideHandle {
    commands: mpsc::Sender<RideCommand>,
    snapshots: watch::Receiver<RideSnapshot>,
    task: JoinHandle<Bike>,
}

impl RideHandle {
    /// Lock the ride.
    ///
    /// A failed lock leaves the ride running; call again to retry.
    ///
    /// # Errors
    ///
    /// - `RideError::Stopped` if the ride task has already exited
    /// - any error from [`Ride::lock`]
    pub async fn lock(&self) -> Result<LockReceipt, RideError> {
        let (reply, response) = oneshot::channel();

        self.commands.send(RideCommand::Lock { reply }).await.map_err(|_| RideError::Stopped)?;

        response.await.map_err(|_| RideError::Stopped)?
    }

    /// Stop telemetry without locking and return the bike.
    ///
    /// # Errors
    ///
    /// - `RideError::Stopped` if the task panicked
    pub async fn cancel(self) -> Result<Bike, RideError> {
        // Already-exited tasks have closed the channel; join either way.
        let _ = self.commands.send(RideCommand::Cancel).await;
        self.join().await
    }

    /// Wait for the task to exit and return the bike.
    ///
    /// Closes the command channel first, so a ride that is still running is
    /// stopped without locking.
    ///
    /// # Errors
    ///
    /// - `RideError::Stopped` if the task panicked
    pub async fn join(self) -> Result<Bike, RideError> {
        let Self { commands, task, .. } = self;
        drop(commands);

        task.await.map_err(|e| {
            tracing::error!(error = %e, "ride task failed");
            RideError::Stopped
        })
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RideSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RideSnapshot> {
        self.snapshots.clone()
    }

    /// Returns true once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Move `ride` and `bike` into a telemetry task.
///
/// `fixes` supplies GPS positions; each tick reads whatever fix is current.
/// The first tick fires one `update_interval` after spawning, since the
/// unlock already sent the confirm update.
///
/// Must be called from within a tokio runtime.
pub fn spawn_ride<G, E>(
    ride: Ride<G, E>,
    bike: Bike,
    fixes: watch::Receiver<Coordinate>,
    config: RideConfig,
) -> RideHandle
where
    G: Gateway,
    E: Environment,
{
    let (commands, inbox) = mpsc::channel(config.command_buffer.max(1));
    let (publisher, snapshots) = watch::channel(RideSnapshot {
        state: ride.state(),
        mileage: ride.mileage(),
        position: ride.position(),
        progress: ride.progress().cloned(),
        accepted_updates: 0,
        failed_updates: 0,
    });

    let actor = RideActor { ride, bike, fixes, inbox, publisher, accepted: 0, failed: 0 };
    let task = tokio::spawn(actor.run(config.update_interval));

    RideHandle { commands, snapshots, task }
}

struct RideActor<G: Gateway, E: Environment> {
    ride: Ride<G, E>,
    bike: Bike,
    fixes: watch::Receiver<Coordinate>,
    inbox: mpsc::Receiver<RideCommand>,
    publisher: watch::Sender<RideSnapshot>,
    accepted: u64,
    failed: u64,
}

impl<G: Gateway, E: Environment> RideActor<G, E> {
    async fn run(mut self, period: Duration) -> Bike {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                command = self.inbox.recv() => match command {
                    Some(RideCommand::Lock { reply }) => {
                        let result = self.lock().await;
                        let locked = result.is_ok();

                        // Requester may have given up waiting.
                        let _ = reply.send(result);

                        if locked {
                            break;
                        }
                    },
                    Some(RideCommand::Cancel) | None => {
                        self.ride.abandon();
                        self.publish();
                        break;
                    },
                },

                _ = ticker.tick() => self.tick().await,
            }
        }

        tracing::debug!(bike_id = self.bike.id(), "telemetry stopped");
        self.bike
    }

    async fn tick(&mut self) {
        let fix = *self.fixes.borrow();

        match self.ride.update(fix).await {
            Ok(_) => self.accepted += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(bike_id = self.bike.id(), error = %e, "telemetry update failed");
            },
        }

        self.publish();
    }

    async fn lock(&mut self) -> Result<LockReceipt, RideError> {
        // Send the final position before the lock itself.
        self.tick().await;

        let result = self.ride.lock(&mut self.bike).await;
        self.publish();
        result
    }

    fn publish(&self) {
        self.publisher.send_replace(RideSnapshot {
            state: self.ride.state(),
            mileage: self.ride.mileage(),
            position: self.ride.position(),
            progress: self.ride.progress().cloned(),
            accepted_updates: self.accepted,
            failed_updates: self.failed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RideConfig::default();

        assert_eq!(config.update_interval, Duration::from_secs(1));
        assert_eq!(config.command_buffer, 8);
    }
}
