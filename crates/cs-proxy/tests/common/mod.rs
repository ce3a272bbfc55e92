//! Fakes shared by the integration tests
//!
//! A scripted broker and spawner let the supervision loop run without
//! Incus, websocat or socat.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cs_core::config::{InstanceProfile, ShareConfig};
use cs_core::{
    Instance, InstanceKind, InstanceStatus, ProcessError, ProxyKey, SessionError, SessionKind,
    ShareError,
};
use cs_proxy::bridge::{BridgeChild, BridgePlan, BridgeSpawner};
use cs_proxy::broker::{ApiResponse, BrokerFactory, ConsoleSession, ManagementApi, SessionBroker};
use cs_proxy::endpoint::RemoteEndpoint;
use cs_proxy::ProxyState;

/// Broker that replays canned session results
#[derive(Default)]
pub struct ScriptedBroker {
    sessions: Mutex<VecDeque<Result<ConsoleSession, ShareError>>>,
    instances: Mutex<Vec<Instance>>,
    opened: Mutex<Vec<(String, String, SessionKind)>>,
}

impl ScriptedBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<ConsoleSession, ShareError>) {
        self.sessions.lock().unwrap().push_back(result);
    }

    pub fn add_instance(&self, name: &str, kind: InstanceKind) {
        self.instances.lock().unwrap().push(Instance {
            name: name.to_string(),
            status: InstanceStatus::Running,
            kind,
        });
    }

    /// (instance, project, kind) for every negotiation so far
    pub fn opened(&self) -> Vec<(String, String, SessionKind)> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionBroker for ScriptedBroker {
    /// Virtual machines get VGA; containers and unknown instances fall back
    /// to the text console, like the real brokers
    async fn classify(&self, instance: &str, _project: &str) -> SessionKind {
        let vm = self
            .instances
            .lock()
            .unwrap()
            .iter()
            .any(|i| i.name == instance && i.kind == InstanceKind::VirtualMachine);
        if vm {
            SessionKind::Vga
        } else {
            SessionKind::Console
        }
    }

    async fn open_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError> {
        self.opened
            .lock()
            .unwrap()
            .push((instance.to_string(), project.to_string(), kind));
        // Once the script runs out, keep handing out exec sessions
        self.sessions.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ConsoleSession::LocalExec {
                argv: vec!["true".to_string()],
            })
        })
    }

    async fn list_instances(&self, _project: &str) -> Result<Vec<Instance>, ShareError> {
        Ok(self.instances.lock().unwrap().clone())
    }
}

/// Broker whose remote never answers
pub struct StalledBroker;

#[async_trait]
impl SessionBroker for StalledBroker {
    async fn classify(&self, _instance: &str, _project: &str) -> SessionKind {
        std::future::pending().await
    }

    async fn open_session(
        &self,
        _instance: &str,
        _project: &str,
        _kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError> {
        std::future::pending().await
    }

    async fn list_instances(&self, _project: &str) -> Result<Vec<Instance>, ShareError> {
        std::future::pending().await
    }
}

/// Hands the same broker out for every remote
pub struct SharedBroker(pub Arc<dyn SessionBroker>);

impl BrokerFactory for SharedBroker {
    fn broker(&self, _endpoint: &RemoteEndpoint) -> Result<Arc<dyn SessionBroker>, ShareError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Management API that answers every POST from a script
#[derive(Default)]
pub struct FakeApi {
    replies: Mutex<VecDeque<ApiResponse>>,
    pub posts: Mutex<Vec<(String, Value)>>,
}

impl FakeApi {
    pub fn push(&self, status: u16, body: Value) {
        self.replies.lock().unwrap().push_back(ApiResponse {
            status,
            body: body.to_string(),
        });
    }
}

/// Shared handle to a [`FakeApi`], so tests keep access to what it recorded
#[derive(Clone)]
pub struct FakeApiHandle(pub Arc<FakeApi>);

#[async_trait]
impl ManagementApi for FakeApiHandle {
    async fn get(&self, _path: &str) -> Result<ApiResponse, SessionError> {
        Err(SessionError::Transport("GET not scripted".into()))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, SessionError> {
        self.0
            .posts
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        self.0
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SessionError::Transport("connection refused".into()))
    }
}

/// How a fake bridge process behaves
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Exit with `code` after `after`
    ExitAfter { code: i32, after: Duration },
    /// Run until terminated
    Serve,
    /// Ignore SIGTERM; only a kill ends it
    IgnoreTerminate,
}

/// Spawner that records plans and hands out scripted children
#[derive(Default)]
pub struct FakeSpawner {
    script: Mutex<VecDeque<Behaviour>>,
    plans: Mutex<Vec<(ProxyKey, BridgePlan)>>,
    terminated: Arc<Mutex<Vec<ProxyKey>>>,
    killed: Arc<Mutex<Vec<(ProxyKey, Instant)>>>,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, behaviour: Behaviour) {
        self.script.lock().unwrap().push_back(behaviour);
    }

    pub fn plans(&self) -> Vec<(ProxyKey, BridgePlan)> {
        self.plans.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    /// Keys whose children received a terminate
    pub fn terminated(&self) -> Vec<ProxyKey> {
        self.terminated.lock().unwrap().clone()
    }

    /// Keys whose children were killed, with the (paused) time of the kill
    pub fn killed(&self) -> Vec<(ProxyKey, Instant)> {
        self.killed.lock().unwrap().clone()
    }
}

impl BridgeSpawner for FakeSpawner {
    fn spawn(&self, key: &ProxyKey, plan: &BridgePlan) -> Result<Box<dyn BridgeChild>, ProcessError> {
        self.plans.lock().unwrap().push((key.clone(), plan.clone()));
        let behaviour = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behaviour::Serve);

        let exit = match behaviour {
            Behaviour::ExitAfter { code, after } => Some((code, Instant::now() + after)),
            Behaviour::Serve | Behaviour::IgnoreTerminate => None,
        };
        Ok(Box::new(FakeChild {
            key: key.clone(),
            exit,
            ignores_terminate: matches!(behaviour, Behaviour::IgnoreTerminate),
            stop: CancellationToken::new(),
            terminated: Arc::clone(&self.terminated),
            killed: Arc::clone(&self.killed),
        }))
    }
}

struct FakeChild {
    key: ProxyKey,
    exit: Option<(i32, Instant)>,
    ignores_terminate: bool,
    stop: CancellationToken,
    terminated: Arc<Mutex<Vec<ProxyKey>>>,
    killed: Arc<Mutex<Vec<(ProxyKey, Instant)>>>,
}

#[async_trait]
impl BridgeChild for FakeChild {
    fn pid(&self) -> Option<u32> {
        // A pid that is guaranteed to be alive
        Some(std::process::id())
    }

    async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        match self.exit {
            Some((code, deadline)) => tokio::select! {
                _ = self.stop.cancelled() => Ok(None),
                _ = tokio::time::sleep_until(deadline) => Ok(Some(code)),
            },
            None => {
                self.stop.cancelled().await;
                Ok(None)
            }
        }
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        self.terminated.lock().unwrap().push(self.key.clone());
        if !self.ignores_terminate {
            self.stop.cancel();
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        self.killed
            .lock()
            .unwrap()
            .push((self.key.clone(), Instant::now()));
        self.stop.cancel();
        Ok(())
    }
}

/// Config with short retry delays and the given instance mappings
pub fn test_config(instances: &[(&str, SessionKind, u16)]) -> ShareConfig {
    let mut config = ShareConfig::default();
    config.retry.delay = Duration::from_millis(100);
    config.retry.max_delay = Duration::from_secs(1);
    config.retry.jitter = 0.0;
    config.bridge.socat_path = PathBuf::from("socat");
    config.bridge.websocat_path = PathBuf::from("websocat");
    for (name, kind, port) in instances {
        config
            .instances
            .insert(name.to_string(), InstanceProfile::new(*kind, *port));
    }
    config
}

/// ProxyState wired to fakes
pub fn fake_state(
    config: ShareConfig,
    broker: Arc<dyn SessionBroker>,
    spawner: Arc<FakeSpawner>,
) -> Arc<ProxyState> {
    Arc::new(ProxyState::with_components(
        config,
        Arc::new(SharedBroker(broker)),
        spawner,
        CancellationToken::new(),
    ))
}
