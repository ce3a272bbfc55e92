//! Bridge supervision
//!
//! A bridge is an external process (`websocat` or `socat`) relaying bytes
//! between a fixed TCP port and a negotiated console endpoint.

pub mod command;
pub mod retry;
pub mod spawner;
pub mod state;
mod supervisor;

pub use command::{build_plan, BridgePlan, PlanContext};
pub use retry::{RetryDecision, RetryPolicy};
pub use spawner::{BridgeChild, BridgeSpawner, ProcessSpawner};
pub use state::{BridgeEvent, BridgeOutcome, BridgeSnapshot, BridgeState};
pub use supervisor::{BridgeHandle, BridgeSettings, BridgeSpec, Supervisor};
