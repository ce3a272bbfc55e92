//! IPC client for communicating with the daemon
//!
//! Uses TCP on localhost, one JSON request and response per line.

mod client;

pub use client::DaemonClient;

// Re-export wire types from cs_core
pub use cs_core::ipc::{DaemonStatus, ProxyInfo};
