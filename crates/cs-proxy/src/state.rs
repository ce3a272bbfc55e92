//! Shared proxy state

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use cs_core::config::ShareConfig;
use cs_core::ipc::DaemonStatus;
use cs_core::{ConfigError, Instance, ProxyKey, SessionKind, ShareError};

use crate::bridge::{
    BridgeHandle, BridgeSettings, BridgeSpawner, BridgeSpec, ProcessSpawner, Supervisor,
};
use crate::broker::{BrokerFactory, ConfiguredBrokers, SessionBroker};
use crate::endpoint::RemoteEndpoint;
use crate::registry::{ProxyRegistry, StartOutcome};

/// A bridge start that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedProxy {
    pub key: ProxyKey,
    pub port: u16,
    pub outcome: StartOutcome,
}

/// Everything the daemon and the foreground commands share
pub struct ProxyState {
    /// Configuration
    pub config: ShareConfig,
    /// Active bridges
    pub registry: Arc<ProxyRegistry>,
    brokers: Arc<dyn BrokerFactory>,
    spawner: Arc<dyn BridgeSpawner>,
    settings: Arc<BridgeSettings>,
    /// Root token; every bridge runs under a child of it
    shutdown: CancellationToken,
    started_at: Instant,
}

impl ProxyState {
    /// State backed by real brokers and processes
    pub fn new(config: ShareConfig, shutdown: CancellationToken) -> Self {
        let brokers = Arc::new(ConfiguredBrokers::new(config.clone()));
        Self::with_components(config, brokers, Arc::new(ProcessSpawner), shutdown)
    }

    /// State with injected brokers and spawner
    pub fn with_components(
        config: ShareConfig,
        brokers: Arc<dyn BrokerFactory>,
        spawner: Arc<dyn BridgeSpawner>,
        shutdown: CancellationToken,
    ) -> Self {
        let settings = Arc::new(BridgeSettings {
            retry: config.retry.clone(),
            bridge: config.bridge.clone(),
            bind_address: config.bind_address.clone(),
        });
        Self {
            config,
            registry: Arc::new(ProxyRegistry::new()),
            brokers,
            spawner,
            settings,
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Endpoint and broker for an instance's remote
    pub fn broker_for(
        &self,
        instance: &str,
    ) -> Result<(RemoteEndpoint, Arc<dyn SessionBroker>), ShareError> {
        let endpoint = RemoteEndpoint::resolve(self.config.remote_for(instance))?;
        let broker = self.brokers.broker(&endpoint)?;
        Ok((endpoint, broker))
    }

    /// Look up an instance through its remote
    pub async fn instance(&self, name: &str) -> Result<Instance, ShareError> {
        let (_, broker) = self.broker_for(name)?;
        broker.get_instance(name, self.config.project_for(name)).await
    }

    /// List instances on the default remote
    pub async fn instances(&self) -> Result<Vec<Instance>, ShareError> {
        let endpoint = RemoteEndpoint::resolve(&self.config.remote)?;
        self.brokers
            .broker(&endpoint)?
            .list_instances(&self.config.project)
            .await
    }

    /// Start (or keep) a bridge for `instance`.
    ///
    /// `kind` and `port` default to the instance mapping; a missing kind is
    /// classified from the instance type. Configuration problems are
    /// returned here; everything after the bridge starts is handled by its
    /// supervisor.
    pub async fn start_proxy(
        &self,
        instance: &str,
        kind: Option<SessionKind>,
        port: Option<u16>,
    ) -> Result<StartedProxy, ShareError> {
        let (spec, broker) = self.prepare(instance, kind, port).await?;
        let key = spec.key.clone();
        let port = spec.port;

        let outcome = self
            .registry
            .start_or_replace(key.clone(), port, || self.spawn(spec, broker))
            .await;

        tracing::info!(key = %key, port, ?outcome, "Proxy start requested");
        Ok(StartedProxy { key, port, outcome })
    }

    /// Start a bridge outside the registry, for foreground use
    pub async fn start_detached(
        &self,
        instance: &str,
        kind: Option<SessionKind>,
        port: Option<u16>,
    ) -> Result<BridgeHandle, ShareError> {
        let (spec, broker) = self.prepare(instance, kind, port).await?;
        Ok(self.spawn(spec, broker))
    }

    /// Stop bridges for `instance`; all kinds when `kind` is None
    pub async fn stop_proxy(&self, instance: &str, kind: Option<SessionKind>) -> Vec<ProxyKey> {
        match kind {
            Some(kind) => {
                let key = ProxyKey::new(instance, kind);
                match self.registry.stop(&key).await {
                    Some(_) => vec![key],
                    None => Vec::new(),
                }
            }
            None => self.registry.stop_instance(instance).await,
        }
    }

    /// Start every enabled instance mapping. Returns how many were accepted.
    ///
    /// Stops early once shutdown has been requested.
    pub async fn start_enabled(&self) -> usize {
        let names: Vec<String> = self
            .config
            .enabled_instances()
            .map(|(name, _)| name.clone())
            .collect();

        let mut started = 0;
        for name in names {
            match self.start_proxy(&name, None, None).await {
                Ok(_) => started += 1,
                Err(ShareError::Cancelled) => break,
                Err(e) => tracing::error!("Failed to start proxy for {}: {}", name, e),
            }
        }
        started
    }

    /// Stop every bridge
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }

    pub async fn status(&self) -> DaemonStatus {
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            pid: std::process::id(),
            remote: self.config.remote.clone(),
            project: self.config.project.clone(),
            proxy_count: self.registry.len().await,
        }
    }

    async fn prepare(
        &self,
        instance: &str,
        kind: Option<SessionKind>,
        port: Option<u16>,
    ) -> Result<(BridgeSpec, Arc<dyn SessionBroker>), ShareError> {
        let profile = self.config.instances.get(instance);
        let port = port
            .or_else(|| profile.and_then(|p| p.port))
            .ok_or_else(|| ConfigError::MissingField(format!("instances.{}.port", instance)))?;

        let (endpoint, broker) = self.broker_for(instance)?;
        let project = self.config.project_for(instance).to_string();

        let kind = match kind.or_else(|| profile.and_then(|p| p.kind)) {
            Some(kind) => kind,
            None => tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ShareError::Cancelled),
                kind = broker.classify(instance, &project) => kind,
            },
        };

        let spec = BridgeSpec {
            key: ProxyKey::new(instance, kind),
            port,
            project,
            endpoint,
        };
        Ok((spec, broker))
    }

    fn spawn(&self, spec: BridgeSpec, broker: Arc<dyn SessionBroker>) -> BridgeHandle {
        Supervisor::start(
            spec,
            broker,
            Arc::clone(&self.spawner),
            Arc::clone(&self.settings),
            self.registry.event_sender(),
            self.shutdown.child_token(),
        )
    }
}
