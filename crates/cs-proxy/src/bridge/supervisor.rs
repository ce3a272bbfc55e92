//! Per-bridge supervision task
//!
//! Each bridge runs as one task: negotiate a session, spawn the bridge
//! process, wait for it, and retry within budget. Every wait is raced
//! against the bridge's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cs_core::config::{BridgeConfig, RetryConfig};
use cs_core::{ProcessError, ProxyKey, ShareError};

use super::command::{build_plan, PlanContext};
use super::retry::{RetryDecision, RetryPolicy};
use super::spawner::{BridgeChild, BridgeSpawner};
use super::state::{BridgeEvent, BridgeOutcome, BridgeSnapshot, BridgeState};
use crate::broker::SessionBroker;
use crate::endpoint::RemoteEndpoint;

/// Settings shared by every bridge
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub retry: RetryConfig,
    pub bridge: BridgeConfig,
    pub bind_address: String,
}

/// What one bridge serves
#[derive(Debug, Clone)]
pub struct BridgeSpec {
    pub key: ProxyKey,
    pub port: u16,
    pub project: String,
    pub endpoint: RemoteEndpoint,
}

/// Handle the registry keeps for a supervised bridge
pub struct BridgeHandle {
    key: ProxyKey,
    port: u16,
    cancel: CancellationToken,
    state: watch::Receiver<BridgeSnapshot>,
    task: JoinHandle<BridgeOutcome>,
}

impl BridgeHandle {
    pub fn key(&self) -> &ProxyKey {
        &self.key
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        self.state.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<BridgeSnapshot> {
        self.state.clone()
    }

    /// Supervision has ended (stopped or given up)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished() || self.state.borrow().state.is_terminal()
    }

    /// Cancel the bridge and wait for its teardown
    pub async fn stop(self) -> BridgeOutcome {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for supervision to end on its own
    pub async fn join(self) -> BridgeOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(key = %self.key, "Supervision task failed: {}", e);
                BridgeOutcome::Stopped
            }
        }
    }
}

enum Attempt {
    Stopped,
    Failed { state: BridgeState, error: ShareError },
}

/// A bridge's supervision loop
pub struct Supervisor {
    spec: BridgeSpec,
    broker: Arc<dyn SessionBroker>,
    spawner: Arc<dyn BridgeSpawner>,
    settings: Arc<BridgeSettings>,
    events: broadcast::Sender<BridgeEvent>,
    state: watch::Sender<BridgeSnapshot>,
    cancel: CancellationToken,
    policy: RetryPolicy,
}

impl Supervisor {
    /// Start supervising a bridge in its own task
    pub fn start(
        spec: BridgeSpec,
        broker: Arc<dyn SessionBroker>,
        spawner: Arc<dyn BridgeSpawner>,
        settings: Arc<BridgeSettings>,
        events: broadcast::Sender<BridgeEvent>,
        cancel: CancellationToken,
    ) -> BridgeHandle {
        let (state_tx, state_rx) = watch::channel(BridgeSnapshot::default());
        let key = spec.key.clone();
        let port = spec.port;
        let policy = RetryPolicy::new(settings.retry.clone());

        let supervisor = Supervisor {
            spec,
            broker,
            spawner,
            settings,
            events,
            state: state_tx,
            cancel: cancel.clone(),
            policy,
        };
        let task = tokio::spawn(supervisor.run());

        BridgeHandle {
            key,
            port,
            cancel,
            state: state_rx,
            task,
        }
    }

    async fn run(mut self) -> BridgeOutcome {
        let key = self.spec.key.clone();
        tracing::info!(key = %key, port = self.spec.port, "Starting bridge");

        let outcome = loop {
            let (state, error) = match self.run_once().await {
                Attempt::Stopped => break BridgeOutcome::Stopped,
                Attempt::Failed { state, error } => (state, error),
            };

            let message = error.to_string();
            self.transition(|s| {
                s.state = state;
                s.pid = None;
                s.last_error = Some(message.clone());
            });
            tracing::warn!(key = %key, state = %state, "Bridge attempt failed: {}", message);

            let decision = if error.is_retryable() {
                self.policy.record_failure()
            } else {
                RetryDecision::GiveUp {
                    attempts: self.policy.failures() + 1,
                }
            };

            match decision {
                RetryDecision::Retry { attempt, delay } => {
                    self.transition(|s| {
                        s.state = BridgeState::Retrying;
                        s.attempts = attempt;
                    });
                    tracing::info!(
                        key = %key,
                        "Retrying in {:?} (attempt {}/{})",
                        delay,
                        attempt,
                        self.policy.max_retries()
                    );
                    if !self.pause(delay).await {
                        break BridgeOutcome::Stopped;
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    self.transition(|s| {
                        s.state = BridgeState::GivenUp;
                        s.attempts = attempts;
                    });
                    tracing::error!(
                        key = %key,
                        "Giving up after {} consecutive failures: {}",
                        attempts,
                        message
                    );
                    break BridgeOutcome::GivenUp {
                        attempts,
                        last_error: message,
                    };
                }
            }
        };

        if outcome == BridgeOutcome::Stopped {
            self.transition(|s| {
                s.state = BridgeState::Stopped;
                s.pid = None;
            });
            tracing::info!(key = %key, "Bridge stopped");
        }

        let _ = self.events.send(BridgeEvent::Finished {
            key,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// One pass through Resolving, Spawning and Running
    async fn run_once(&mut self) -> Attempt {
        self.transition(|s| s.state = BridgeState::Resolving);

        let negotiated = tokio::select! {
            _ = self.cancel.cancelled() => return Attempt::Stopped,
            result = self.broker.open_session(
                &self.spec.key.instance,
                &self.spec.project,
                self.spec.key.kind,
            ) => result,
        };
        let session = match negotiated {
            Ok(session) => session,
            Err(error) => {
                return Attempt::Failed {
                    state: BridgeState::Failed,
                    error,
                }
            }
        };
        tracing::debug!(key = %self.spec.key, "Negotiated {}", session.describe());

        self.transition(|s| s.state = BridgeState::Spawning);
        let plan = build_plan(
            &session,
            &PlanContext {
                kind: self.spec.key.kind,
                endpoint: &self.spec.endpoint,
                project: &self.spec.project,
                bind_address: &self.settings.bind_address,
                port: self.spec.port,
                bridge: &self.settings.bridge,
            },
        );
        tracing::info!(key = %self.spec.key, "Spawning {}", plan.redacted());

        let mut child = match self.spawner.spawn(&self.spec.key, &plan) {
            Ok(child) => child,
            Err(e) => {
                return Attempt::Failed {
                    state: BridgeState::Failed,
                    error: e.into(),
                }
            }
        };

        let pid = child.pid();
        // Only consecutive failures count against the budget
        let reset_now = self.policy.stable_after().is_zero();
        if reset_now {
            self.policy.reset();
        }
        self.transition(|s| {
            s.state = BridgeState::Running;
            s.pid = pid;
            if reset_now {
                s.attempts = 0;
            }
        });
        tracing::info!(
            key = %self.spec.key,
            pid = pid.unwrap_or_default(),
            "Bridge listening on {}:{}",
            self.settings.bind_address,
            self.spec.port
        );

        let exit = self.monitor(child.as_mut()).await;
        let attempt = match exit {
            None => {
                self.shutdown_child(child.as_mut()).await;
                Attempt::Stopped
            }
            Some(Ok(Some(0))) => Attempt::Failed {
                state: BridgeState::Exited,
                error: ProcessError::Exited { code: Some(0) }.into(),
            },
            Some(Ok(code)) => Attempt::Failed {
                state: BridgeState::Failed,
                error: ProcessError::Exited { code }.into(),
            },
            Some(Err(e)) => Attempt::Failed {
                state: BridgeState::Failed,
                error: e.into(),
            },
        };

        // Releases the captured socket / console client, if any
        drop(session);
        attempt
    }

    /// Wait for the child to exit. Returns None when cancelled.
    ///
    /// With a non-zero `stable_after`, the failure count is reset once the
    /// bridge has stayed up that long.
    async fn monitor(
        &mut self,
        child: &mut dyn BridgeChild,
    ) -> Option<Result<Option<i32>, ProcessError>> {
        let stable_after = self.policy.stable_after();
        let stable = tokio::time::sleep(stable_after);
        tokio::pin!(stable);
        let mut counted = stable_after.is_zero();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = &mut stable, if !counted => {
                    counted = true;
                    self.mark_stable();
                }
                exit = child.wait() => return Some(exit),
            }
        }
    }

    fn mark_stable(&mut self) {
        if self.policy.failures() > 0 {
            tracing::debug!(key = %self.spec.key, "Bridge stable, resetting failure count");
        }
        self.policy.reset();
        self.transition(|s| s.attempts = 0);
    }

    /// SIGTERM, then SIGKILL after the grace period
    async fn shutdown_child(&self, child: &mut dyn BridgeChild) {
        let key = &self.spec.key;
        if let Err(e) = child.terminate() {
            tracing::debug!(key = %key, "SIGTERM failed: {}", e);
        }

        match tokio::time::timeout(self.settings.bridge.stop_grace, child.wait()).await {
            Ok(_) => tracing::debug!(key = %key, "Bridge exited after SIGTERM"),
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    "Bridge ignored SIGTERM for {:?}, killing",
                    self.settings.bridge.stop_grace
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(key = %key, "Failed to kill bridge: {}", e);
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false when cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn transition(&self, update: impl FnOnce(&mut BridgeSnapshot)) {
        self.state.send_modify(update);
        let snapshot = self.state.borrow().clone();
        let _ = self.events.send(BridgeEvent::StateChanged {
            key: self.spec.key.clone(),
            snapshot,
        });
    }
}
