//! Deterministic simulation harness for Pedalock protocol testing.
//!
//! Seeded implementations of the Environment and Gateway traits for
//! reproducible tests of the ride and fleet drivers. Combine with a paused
//! tokio clock (`#[tokio::test(start_paused = true)]`) to make telemetry
//! timing deterministic as well.
//!
//! # Components
//!
//! - [`SimEnv`]: seeded `ChaCha20` randomness
//! - [`SimGateway`]: in-memory backend with fault injection and a request log
//! - [`scenario`]: provision, ride and lock end to end

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_gateway;

pub use scenario::{ScenarioConfig, ScenarioError, ScenarioReport, run_scenario};
pub use sim_env::SimEnv;
pub use sim_gateway::{
    EchoFault, Endpoint, Exchange, FaultPlan, SimGateway, SimGatewayConfig, TelemetryRecord,
};
