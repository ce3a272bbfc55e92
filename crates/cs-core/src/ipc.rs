//! IPC protocol between the CLI and the proxy daemon
//!
//! Line-delimited JSON over TCP on localhost (127.0.0.1). Each request
//! gets exactly one response on the same connection.

use serde::{Deserialize, Serialize};

use crate::types::{ProxyKey, SessionKind};

/// IPC request from the CLI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Liveness check
    Ping,

    /// Get daemon status
    Status,

    /// List running bridges
    ListProxies,

    /// Start (or replace) a bridge.
    ///
    /// `kind` and `port` fall back to the instance's configured mapping.
    StartProxy {
        instance: String,
        #[serde(default)]
        kind: Option<SessionKind>,
        #[serde(default)]
        port: Option<u16>,
    },

    /// Stop bridges for an instance (all kinds when `kind` is None)
    StopProxy {
        instance: String,
        #[serde(default)]
        kind: Option<SessionKind>,
    },

    /// Stop every bridge and exit
    Shutdown,
}

/// IPC response from the daemon to the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Pong response
    Pong,

    /// Daemon status
    Status(DaemonStatus),

    /// Running bridges
    Proxies { proxies: Vec<ProxyInfo> },

    /// Bridge started (or already running with the same port)
    Started { key: ProxyKey, port: u16 },

    /// Keys that were stopped; empty when nothing matched
    Stopped { keys: Vec<ProxyKey> },

    /// Generic success
    Ok,

    /// Error response
    Error { message: String },
}

/// Daemon status information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Daemon process id
    pub pid: u32,
    /// Remote the daemon talks to
    pub remote: String,
    /// Default project
    pub project: String,
    /// Number of live bridges
    pub proxy_count: usize,
}

/// One row of the proxy listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    /// Registry key
    pub key: ProxyKey,
    /// Session kind
    pub kind: SessionKind,
    /// Bridge process id, when one is running
    pub pid: Option<u32>,
    /// Lifecycle state name
    pub state: String,
    /// Listening port
    pub port: u16,
    /// Consecutive failures so far
    pub attempts: u32,
    /// Most recent failure
    pub last_error: Option<String>,
}

impl IpcRequest {
    /// Encode as a single JSON line (newline included)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl IpcResponse {
    /// Encode as a single JSON line (newline included)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Build an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }
}
