//! cs-core: Shared types, errors and configuration for console-share
//!
//! This crate holds everything the proxy engine and the CLI agree on:
//! session and instance types, the error taxonomy, the TOML configuration
//! and the IPC wire format.

pub mod config;
pub mod error;
pub mod ipc;
pub mod pidfile;
pub mod types;

pub use error::{ConfigError, InterceptionError, ProcessError, SessionError, ShareError};
pub use types::{Instance, InstanceKind, InstanceStatus, ProxyKey, SessionKind};
