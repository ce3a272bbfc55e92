//! Bridge lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

use cs_core::ProxyKey;

/// Where a bridge is in its lifecycle.
///
/// `Resolving -> Spawning -> Running -> (Exited | Failed) -> Retrying ->
/// Resolving ...`, ending at `Stopped` or `GivenUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Negotiating a session with Incus
    Resolving,
    /// Launching the bridge process
    Spawning,
    /// Bridge process is up
    Running,
    /// Bridge exited cleanly while it was supposed to run
    Exited,
    /// Negotiation, spawn or the bridge process failed
    Failed,
    /// Waiting out the retry delay
    Retrying,
    /// Stopped on request
    Stopped,
    /// Retry budget exhausted
    GivenUp,
}

impl BridgeState {
    /// No further transitions follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgeState::Stopped | BridgeState::GivenUp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Resolving => "resolving",
            BridgeState::Spawning => "spawning",
            BridgeState::Running => "running",
            BridgeState::Exited => "exited",
            BridgeState::Failed => "failed",
            BridgeState::Retrying => "retrying",
            BridgeState::Stopped => "stopped",
            BridgeState::GivenUp => "given_up",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    pub state: BridgeState,
    /// Pid of the bridge process while one exists
    pub pid: Option<u32>,
    /// Consecutive failures counted against the retry budget
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Default for BridgeSnapshot {
    fn default() -> Self {
        Self {
            state: BridgeState::Resolving,
            pid: None,
            attempts: 0,
            last_error: None,
        }
    }
}

/// How a supervision task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BridgeOutcome {
    /// Stopped on request (or by shutdown)
    Stopped,
    /// Gave up after `attempts` consecutive failures
    GivenUp { attempts: u32, last_error: String },
}

impl BridgeOutcome {
    pub fn is_given_up(&self) -> bool {
        matches!(self, BridgeOutcome::GivenUp { .. })
    }
}

/// Broadcast to registry subscribers
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A bridge moved to a new state
    StateChanged {
        key: ProxyKey,
        snapshot: BridgeSnapshot,
    },
    /// A supervision task finished
    Finished { key: ProxyKey, outcome: BridgeOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(BridgeState::Stopped.is_terminal());
        assert!(BridgeState::GivenUp.is_terminal());
        assert!(!BridgeState::Retrying.is_terminal());
        assert!(!BridgeState::Running.is_terminal());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(BridgeState::GivenUp.to_string(), "given_up");
        assert_eq!(
            serde_json::to_string(&BridgeState::GivenUp).unwrap(),
            r#""given_up""#
        );
    }
}
