//! IPC server for CLI communication
//!
//! Provides the localhost TCP endpoint the `console-share` CLI uses to
//! talk to a running daemon.

mod server;

pub use server::IpcServer;
