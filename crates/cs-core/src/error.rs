//! Core error types for console-share

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::ProxyKey;

/// Top-level error type for the console-share engine
#[derive(Error, Debug)]
pub enum ShareError {
    /// Malformed input; never retried
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Negotiation with the management surface failed
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The capture shim never observed a socket path
    #[error("Interception error: {0}")]
    Interception(#[from] InterceptionError),

    /// The bridge process failed to spawn or exited
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Retry budget exhausted for one bridge
    #[error("Gave up on {key} after {attempts} consecutive failures: {last_error}")]
    GivenUp {
        key: ProxyKey,
        attempts: u32,
        last_error: String,
    },

    /// Shutdown arrived before the request finished
    #[error("Shutting down")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShareError {
    /// Whether the supervision loop may retry after this error.
    ///
    /// Configuration errors, exhausted budgets and shutdown are final;
    /// everything else is a transport or negotiation failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ShareError::Config(_) | ShareError::GivenUp { .. } | ShareError::Cancelled
        )
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Remote address could not be resolved
    #[error("Invalid remote '{remote}': {reason}")]
    InvalidRemote { remote: String, reason: String },

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Session negotiation errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The management API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A required secret was absent from the operation metadata
    #[error("Operation response is missing the {0} secret")]
    MissingSecret(&'static str),

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request never reached the management API
    #[error("Transport error: {0}")]
    Transport(String),

    /// The management CLI failed
    #[error("Command `{command}` failed: {stderr}")]
    Cli { command: String, stderr: String },

    /// Instance not found
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Instance exists but is not running
    #[error("Instance {0} is not running")]
    NotRunning(String),
}

/// Socket interception errors
#[derive(Error, Debug)]
pub enum InterceptionError {
    /// Nothing was captured before the deadline
    #[error("No socket path captured in {log_path:?} within {timeout:?}")]
    Timeout { log_path: PathBuf, timeout: Duration },

    /// A path was captured but the socket is no longer there
    #[error("Captured socket {0:?} does not exist")]
    SocketMissing(PathBuf),

    /// The console client exited before invoking the helper
    #[error("Console client exited before the helper was invoked (code {code:?})")]
    ClientExited { code: Option<i32> },

    /// Failed to set up the stand-in helper
    #[error("Failed to install capture helper: {0}")]
    Install(#[source] std::io::Error),
}

/// Bridge process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The bridge program could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The bridge exited while it was supposed to be running
    #[error("Bridge exited with {}", describe_exit(.code))]
    Exited { code: Option<i32> },

    /// Waiting on or signalling the process failed
    #[error("Process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionKind;

    #[test]
    fn test_config_errors_are_not_retryable() {
        let err = ShareError::from(ConfigError::Invalid("bad".into()));
        assert!(!err.is_retryable());

        let err = ShareError::GivenUp {
            key: ProxyKey::new("web1", SessionKind::Vga),
            attempts: 4,
            last_error: "boom".into(),
        };
        assert!(!err.is_retryable());
        assert!(!ShareError::Cancelled.is_retryable());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = ShareError::from(SessionError::Status {
            status: 500,
            body: "oops".into(),
        });
        assert!(err.is_retryable());
        assert!(ShareError::from(ProcessError::Exited { code: Some(1) }).is_retryable());
        assert!(ShareError::from(InterceptionError::SocketMissing("/tmp/x".into())).is_retryable());
    }

    #[test]
    fn test_status_message_includes_body() {
        let err = SessionError::Status {
            status: 500,
            body: "{\"error\":\"internal\"}".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("internal"));
    }

    #[test]
    fn test_not_running_message() {
        let err = ShareError::from(SessionError::NotRunning("web1".into()));
        assert_eq!(err.to_string(), "Session error: Instance web1 is not running");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_exit_description() {
        assert_eq!(
            ProcessError::Exited { code: Some(2) }.to_string(),
            "Bridge exited with code 2"
        );
        assert_eq!(
            ProcessError::Exited { code: None }.to_string(),
            "Bridge exited with a signal"
        );
    }
}
