//! console-share: command-line interface
//!
//! Provides the `console-share` binary: the proxy daemon, foreground
//! single-bridge commands, and management commands that talk to a running
//! daemon over IPC.

pub mod commands;
pub mod ipc;
pub mod output;
