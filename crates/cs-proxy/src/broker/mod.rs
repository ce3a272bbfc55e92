//! Session brokers
//!
//! A broker negotiates a console or shell with Incus and hands back a
//! [`ConsoleSession`] the bridge can be pointed at. Two strategies exist:
//! the REST API ([`ApiBroker`]) and the `incus` CLI ([`CliBroker`]).

mod api;
mod cli;
pub mod transport;

pub use api::ApiBroker;
pub use cli::{parse_instance_list, CliBroker};
pub use transport::{ApiResponse, ManagementApi};

use std::sync::Arc;

use async_trait::async_trait;

use cs_core::config::{ShareConfig, TransportMode};
use cs_core::{Instance, SessionError, SessionKind, ShareError};

use crate::endpoint::RemoteEndpoint;
use crate::shim::CapturedSocket;

/// A negotiated console or shell, consumed once to build a bridge.
///
/// Holding the value keeps any associated resource (captured socket,
/// console client) alive; dropping it releases them.
#[derive(Debug)]
pub enum ConsoleSession {
    /// Websocket operation with single-use secrets
    Api {
        operation: String,
        secret: String,
        control_secret: String,
    },
    /// SPICE socket captured from the console client
    LocalSocket(CapturedSocket),
    /// Command the bridge runs under a pty for every connection
    LocalExec { argv: Vec<String> },
}

impl ConsoleSession {
    /// Short description for logs; never includes secrets
    pub fn describe(&self) -> String {
        match self {
            ConsoleSession::Api { operation, .. } => format!("operation {}", operation),
            ConsoleSession::LocalSocket(socket) => format!("socket {:?}", socket.path()),
            ConsoleSession::LocalExec { argv } => format!("exec `{}`", argv.join(" ")),
        }
    }
}

/// Negotiates sessions with one remote
#[async_trait]
pub trait SessionBroker: Send + Sync {
    /// Text console or VGA, from the instance type.
    ///
    /// Never fails: when the metadata cannot be fetched the broker logs the
    /// failure and falls back to [`SessionKind::Console`].
    async fn classify(&self, instance: &str, project: &str) -> SessionKind;

    /// Open a session of `kind` on `instance`
    async fn open_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError>;

    /// List instances in `project`
    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>, ShareError>;

    /// Fetch a single instance by exact name
    async fn get_instance(&self, name: &str, project: &str) -> Result<Instance, ShareError> {
        self.list_instances(project)
            .await?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| SessionError::InstanceNotFound(name.to_string()).into())
    }
}

/// Builds the broker for a remote
pub trait BrokerFactory: Send + Sync {
    fn broker(&self, endpoint: &RemoteEndpoint) -> Result<Arc<dyn SessionBroker>, ShareError>;
}

/// Broker factory driven by the configured transport mode
pub struct ConfiguredBrokers {
    config: ShareConfig,
}

impl ConfiguredBrokers {
    pub fn new(config: ShareConfig) -> Self {
        Self { config }
    }
}

impl BrokerFactory for ConfiguredBrokers {
    fn broker(&self, endpoint: &RemoteEndpoint) -> Result<Arc<dyn SessionBroker>, ShareError> {
        match self.config.transport {
            TransportMode::Api => {
                let api = transport::connect(endpoint, &self.config.bridge)?;
                Ok(Arc::new(ApiBroker::new(api, self.config.shell.clone())))
            }
            TransportMode::Cli => Ok(Arc::new(CliBroker::new(
                self.config.bridge.incus_path.clone(),
                self.config.shell.clone(),
                self.config.capture.clone(),
            ))),
        }
    }
}
