//! cs-proxy: Incus console proxy engine
//!
//! Negotiates console and shell sessions with Incus, captures the VGA
//! socket the `incus` client negotiates internally, and supervises the
//! `websocat`/`socat` bridges that expose each session on a fixed TCP
//! port, retrying within a bounded budget.

pub mod bridge;
pub mod broker;
pub mod endpoint;
pub mod ipc;
pub mod registry;
pub mod shim;
pub mod state;

pub use bridge::{BridgeEvent, BridgeHandle, BridgeOutcome, BridgeState};
pub use endpoint::RemoteEndpoint;
pub use registry::{ProxyRegistry, StartOutcome};
pub use state::{ProxyState, StartedProxy};
