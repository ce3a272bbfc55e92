//! Proxy registry
//!
//! The table of supervised bridges, one per (instance, session kind). A
//! single lock guards the whole map; bridges never touch it themselves.

use std::collections::HashMap;

use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use cs_core::ipc::ProxyInfo;
use cs_core::pidfile::is_process_alive;
use cs_core::ProxyKey;

use crate::bridge::{BridgeEvent, BridgeHandle, BridgeOutcome};

/// Result of [`ProxyRegistry::start_or_replace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No bridge existed for the key
    Started,
    /// A live bridge on the same port was kept
    AlreadyRunning,
    /// The previous bridge was stopped and a new one started
    Replaced,
}

/// A key's entry in the table
enum Slot {
    Active(BridgeHandle),
    /// The previous bridge is tearing down; `done` fires once it is gone
    Stopping { done: CancellationToken },
}

/// In-memory table of active bridges
///
/// The lock is never held across a bridge teardown. A key whose bridge is
/// being stopped holds a `Stopping` slot, and calls for that key wait for
/// it while every other key stays available.
pub struct ProxyRegistry {
    bridges: Mutex<HashMap<ProxyKey, Slot>>,
    events: broadcast::Sender<BridgeEvent>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            bridges: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Sender handed to supervisors
    pub fn event_sender(&self) -> broadcast::Sender<BridgeEvent> {
        self.events.clone()
    }

    /// Subscribe to bridge state changes and outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Ensure a bridge for `key` is serving `port`.
    ///
    /// A live bridge on the same port is kept. Anything else under the key
    /// is stopped before `factory` starts the replacement, so there is never
    /// more than one bridge per key.
    pub async fn start_or_replace<F>(&self, key: ProxyKey, port: u16, factory: F) -> StartOutcome
    where
        F: FnOnce() -> BridgeHandle,
    {
        loop {
            let mut bridges = self.bridges.lock().await;

            let existing = match bridges.remove(&key) {
                Some(Slot::Stopping { done }) => {
                    bridges.insert(key.clone(), Slot::Stopping { done: done.clone() });
                    drop(bridges);
                    done.cancelled().await;
                    continue;
                }
                Some(Slot::Active(existing))
                    if !existing.is_finished() && existing.port() == port =>
                {
                    tracing::debug!(key = %key, port, "Bridge already running");
                    bridges.insert(key, Slot::Active(existing));
                    return StartOutcome::AlreadyRunning;
                }
                Some(Slot::Active(existing)) => existing,
                None => {
                    bridges.insert(key, Slot::Active(factory()));
                    return StartOutcome::Started;
                }
            };

            tracing::info!(key = %key, "Replacing bridge on port {}", existing.port());
            let done = CancellationToken::new();
            bridges.insert(key.clone(), Slot::Stopping { done: done.clone() });
            drop(bridges);

            existing.stop().await;

            self.bridges
                .lock()
                .await
                .insert(key, Slot::Active(factory()));
            done.cancel();
            return StartOutcome::Replaced;
        }
    }

    /// Stop the bridge under `key`.
    ///
    /// Unknown keys are a no-op and return None, as does a key another
    /// caller is already stopping (once that stop has finished).
    pub async fn stop(&self, key: &ProxyKey) -> Option<BridgeOutcome> {
        let (handle, done) = {
            let mut bridges = self.bridges.lock().await;
            match bridges.remove(key)? {
                Slot::Active(handle) => {
                    let done = CancellationToken::new();
                    bridges.insert(key.clone(), Slot::Stopping { done: done.clone() });
                    (handle, done)
                }
                Slot::Stopping { done } => {
                    bridges.insert(key.clone(), Slot::Stopping { done: done.clone() });
                    drop(bridges);
                    done.cancelled().await;
                    return None;
                }
            }
        };

        tracing::info!(key = %key, "Stopping bridge");
        let outcome = handle.stop().await;

        {
            let mut bridges = self.bridges.lock().await;
            if matches!(bridges.get(key), Some(Slot::Stopping { .. })) {
                bridges.remove(key);
            }
        }
        done.cancel();
        Some(outcome)
    }

    /// Stop every bridge belonging to `instance`
    pub async fn stop_instance(&self, instance: &str) -> Vec<ProxyKey> {
        let keys: Vec<ProxyKey> = {
            let bridges = self.bridges.lock().await;
            bridges
                .iter()
                .filter(|(k, slot)| k.instance == instance && matches!(slot, Slot::Active(_)))
                .map(|(k, _)| k.clone())
                .collect()
        };

        let outcomes = join_all(keys.iter().map(|key| self.stop(key))).await;
        keys.into_iter()
            .zip(outcomes)
            .filter_map(|(key, outcome)| outcome.map(|_| key))
            .collect()
    }

    /// Live bridges, sorted by key.
    ///
    /// Finished supervision tasks are reaped first, and a pid whose process
    /// is gone is never reported. Bridges being stopped are left out.
    pub async fn list(&self) -> Vec<ProxyInfo> {
        let mut bridges = self.bridges.lock().await;
        self.reap(&mut bridges).await;

        let mut proxies: Vec<ProxyInfo> = bridges
            .values()
            .filter_map(|slot| match slot {
                Slot::Active(handle) => Some(handle),
                Slot::Stopping { .. } => None,
            })
            .map(|handle| {
                let snapshot = handle.snapshot();
                ProxyInfo {
                    key: handle.key().clone(),
                    kind: handle.key().kind,
                    pid: snapshot.pid.filter(|pid| is_process_alive(*pid)),
                    state: snapshot.state.to_string(),
                    port: handle.port(),
                    attempts: snapshot.attempts,
                    last_error: snapshot.last_error,
                }
            })
            .collect();
        proxies.sort_by(|a, b| a.key.cmp(&b.key));
        proxies
    }

    /// Number of bridges still under supervision
    pub async fn len(&self) -> usize {
        let mut bridges = self.bridges.lock().await;
        self.reap(&mut bridges).await;
        bridges
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every bridge concurrently, including ones already stopping
    pub async fn shutdown_all(&self) {
        let slots: Vec<Slot> = {
            let mut bridges = self.bridges.lock().await;
            bridges.drain().map(|(_, slot)| slot).collect()
        };
        if slots.is_empty() {
            return;
        }

        tracing::info!("Stopping {} bridges", slots.len());
        let count = slots.len();
        join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Active(handle) => {
                    handle.stop().await;
                }
                Slot::Stopping { done } => done.cancelled().await,
            }
        }))
        .await;
        tracing::info!("All {} bridges stopped", count);
    }

    async fn reap(&self, bridges: &mut HashMap<ProxyKey, Slot>) {
        let finished: Vec<ProxyKey> = bridges
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(handle) if handle.is_finished()))
            .map(|(key, _)| key.clone())
            .collect();

        for key in finished {
            if let Some(Slot::Active(handle)) = bridges.remove(&key) {
                let outcome = handle.join().await;
                tracing::debug!(key = %key, ?outcome, "Reaped bridge");
            }
        }
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
