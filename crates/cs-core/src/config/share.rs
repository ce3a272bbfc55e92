//! Proxy daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use super::InstanceProfile;

/// Default Incus API socket
pub const DEFAULT_UNIX_SOCKET: &str = "/var/lib/incus/unix.socket";

/// Default remote (the local Incus socket)
pub const DEFAULT_REMOTE: &str = "unix:/var/lib/incus/unix.socket";

/// Default project
pub const DEFAULT_PROJECT: &str = "default";

/// Default IPC port for CLI to daemon communication
pub const DEFAULT_IPC_PORT: u16 = 22240;

/// How sessions are negotiated with Incus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Console operations over the REST API, bridged with websocat
    #[default]
    Api,
    /// The `incus` command-line tool, bridged with socat
    Cli,
}

/// Configuration for the console-share daemon and foreground proxies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Remote address (`unix:<path>`, `host`, `host:port` or `https://host:port`)
    pub remote: String,

    /// Project instances live in
    pub project: String,

    /// Address bridges listen on
    pub bind_address: String,

    /// First port handed out when generating instance mappings
    pub start_port: u16,

    /// IPC port for CLI communication (localhost only)
    pub ipc_port: u16,

    /// Session negotiation strategy
    pub transport: TransportMode,

    /// Retry policy for failed bridges
    pub retry: RetryConfig,

    /// External bridge programs and credentials
    pub bridge: BridgeConfig,

    /// Socket interception settings
    pub capture: CaptureConfig,

    /// Shell sessions
    pub shell: ShellConfig,

    /// Instance mappings
    pub instances: BTreeMap<String, InstanceProfile>,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            project: DEFAULT_PROJECT.to_string(),
            bind_address: "0.0.0.0".to_string(),
            start_port: 8000,
            ipc_port: DEFAULT_IPC_PORT,
            transport: TransportMode::default(),
            retry: RetryConfig::default(),
            bridge: BridgeConfig::default(),
            capture: CaptureConfig::default(),
            shell: ShellConfig::default(),
            instances: BTreeMap::new(),
        }
    }
}

impl ShareConfig {
    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// Remote for an instance, falling back to the global remote
    pub fn remote_for(&self, instance: &str) -> &str {
        self.instances
            .get(instance)
            .and_then(|p| p.remote.as_deref())
            .unwrap_or(&self.remote)
    }

    /// Project for an instance, falling back to the global project
    pub fn project_for(&self, instance: &str) -> &str {
        self.instances
            .get(instance)
            .and_then(|p| p.project.as_deref())
            .unwrap_or(&self.project)
    }

    /// Enabled instance mappings that carry a port
    pub fn enabled_instances(&self) -> impl Iterator<Item = (&String, &InstanceProfile)> {
        self.instances
            .iter()
            .filter(|(_, profile)| profile.enabled && profile.port.is_some())
    }
}

/// Bounded retry policy for bridges
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Consecutive failures tolerated before giving up
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub delay: Duration,

    /// Multiplier applied to the delay after each retry (1.0 = fixed)
    pub multiplier: f64,

    /// Upper bound for the delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// How long a bridge must stay up before its failure count resets.
    /// Zero resets it as soon as the bridge is running.
    #[serde(with = "duration_secs")]
    pub stable_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
            stable_after: Duration::ZERO,
        }
    }
}

/// External bridge programs and credential material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// TCP to WebSocket bridge
    pub websocat_path: PathBuf,

    /// TCP to Unix-socket / exec bridge
    pub socat_path: PathBuf,

    /// Incus command-line tool
    pub incus_path: PathBuf,

    /// Grace period between SIGTERM and SIGKILL when stopping a bridge
    #[serde(with = "duration_secs")]
    pub stop_grace: Duration,

    /// Client certificate (PEM) for the management API
    pub client_cert: PathBuf,

    /// Client key (PEM) for the management API
    pub client_key: PathBuf,

    /// Client certificate bundle (PKCS#12, DER) handed to websocat
    pub client_pkcs12: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let incus_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("incus");

        Self {
            websocat_path: PathBuf::from("websocat"),
            socat_path: PathBuf::from("socat"),
            incus_path: PathBuf::from("incus"),
            stop_grace: Duration::from_secs(5),
            client_cert: incus_dir.join("client.crt"),
            client_key: incus_dir.join("client.key"),
            client_pkcs12: incus_dir.join("client.p12"),
        }
    }
}

impl BridgeConfig {
    /// Certificate and key, when both exist on disk
    pub fn client_identity(&self) -> Option<(&PathBuf, &PathBuf)> {
        (self.client_cert.exists() && self.client_key.exists())
            .then_some((&self.client_cert, &self.client_key))
    }

    /// PKCS#12 bundle, when it exists on disk
    pub fn client_bundle(&self) -> Option<&PathBuf> {
        self.client_pkcs12.exists().then_some(&self.client_pkcs12)
    }
}

/// Settings for the VGA socket interception shim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory the per-session stand-in directories are created under
    pub base_dir: PathBuf,

    /// How long to wait for the stand-in to record a socket path
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Polling interval for the capture log
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("console-share"),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Shell session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Command run inside the instance
    pub command: String,

    /// TERM exported to the shell
    pub term: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: "/bin/bash".to_string(),
            term: "xterm-256color".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionKind;

    #[test]
    fn test_defaults() {
        let config = ShareConfig::default();
        assert_eq!(config.remote, DEFAULT_REMOTE);
        assert_eq!(config.project, "default");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(5));
        assert_eq!(config.capture.poll_interval, Duration::from_millis(100));
        assert_eq!(config.ipc_address(), "127.0.0.1:22240");
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            remote = "incus.example.com"
            transport = "cli"

            [retry]
            max_retries = 5
            delay = 2

            [instances.web1]
            kind = "vga"
            port = 8001

            [instances.db1]
            kind = "shell"
            port = 8002
            project = "staging"
            enabled = false
        "#;

        let config: ShareConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.remote, "incus.example.com");
        assert_eq!(config.transport, TransportMode::Cli);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.delay, Duration::from_secs(2));
        // Unspecified fields keep their defaults
        assert_eq!(config.retry.stable_after, Duration::ZERO);
        assert_eq!(config.project, "default");

        let web1 = &config.instances["web1"];
        assert_eq!(web1.kind, Some(SessionKind::Vga));
        assert!(web1.enabled);

        assert_eq!(config.project_for("db1"), "staging");
        assert_eq!(config.project_for("web1"), "default");
        assert_eq!(config.remote_for("db1"), "incus.example.com");

        let enabled: Vec<_> = config.enabled_instances().map(|(n, _)| n.as_str()).collect();
        assert_eq!(enabled, vec!["web1"]);
    }

    #[test]
    fn test_missing_credentials_are_not_offered() {
        let bridge = BridgeConfig {
            client_cert: PathBuf::from("/nonexistent/client.crt"),
            client_key: PathBuf::from("/nonexistent/client.key"),
            client_pkcs12: PathBuf::from("/nonexistent/client.p12"),
            ..Default::default()
        };
        assert!(bridge.client_identity().is_none());
        assert!(bridge.client_bundle().is_none());
    }
}
