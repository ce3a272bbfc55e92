//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Kind of managed workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceKind {
    /// System container
    Container,
    /// Full virtual machine
    VirtualMachine,
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Container => write!(f, "container"),
            InstanceKind::VirtualMachine => write!(f, "virtual-machine"),
        }
    }
}

impl FromStr for InstanceKind {
    type Err = ConfigError;

    /// Accepts both the API spelling (`virtual-machine`) and the CLI
    /// table spelling (`VIRTUAL-MACHINE`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" => Ok(InstanceKind::Container),
            "virtual-machine" | "virtual_machine" | "vm" => Ok(InstanceKind::VirtualMachine),
            other => Err(ConfigError::Invalid(format!("unknown instance type: {}", other))),
        }
    }
}

/// Lifecycle status of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Other(String),
}

impl InstanceStatus {
    /// Parse a status string, case-insensitively
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => InstanceStatus::Running,
            "stopped" => InstanceStatus::Stopped,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Stopped => write!(f, "stopped"),
            InstanceStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Snapshot of a managed instance.
///
/// Fetched on demand and never cached beyond a single resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name, unique within its project
    pub name: String,
    /// Lifecycle status
    pub status: InstanceStatus,
    /// Container or virtual machine
    pub kind: InstanceKind,
}

impl Instance {
    /// Check if the instance is running
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// Session kind a proxy for this instance defaults to
    pub fn default_session_kind(&self) -> SessionKind {
        match self.kind {
            InstanceKind::VirtualMachine => SessionKind::Vga,
            InstanceKind::Container => SessionKind::Shell,
        }
    }
}

/// Kind of console session a bridge exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Interactive shell inside the instance
    Shell,
    /// Text (serial) console
    Console,
    /// Graphical (SPICE) console
    Vga,
}

impl SessionKind {
    /// Whether this is the graphical console kind
    pub fn is_graphical(&self) -> bool {
        matches!(self, SessionKind::Vga)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Shell => "shell",
            SessionKind::Console => "console",
            SessionKind::Vga => "vga",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shell" => Ok(SessionKind::Shell),
            "console" => Ok(SessionKind::Console),
            "vga" => Ok(SessionKind::Vga),
            other => Err(ConfigError::Invalid(format!("unknown session kind: {}", other))),
        }
    }
}

/// Registry key for a bridge: one per instance and session kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyKey {
    pub instance: String,
    pub kind: SessionKind,
}

impl ProxyKey {
    /// Create a new proxy key
    pub fn new(instance: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            instance: instance.into(),
            kind,
        }
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.instance)
    }
}

impl FromStr for ProxyKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, instance) = s
            .split_once('_')
            .ok_or_else(|| ConfigError::Invalid(format!("malformed proxy key: {}", s)))?;
        if instance.is_empty() {
            return Err(ConfigError::Invalid(format!("malformed proxy key: {}", s)));
        }
        Ok(Self::new(instance, kind.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_key_display() {
        let key = ProxyKey::new("web1", SessionKind::Vga);
        assert_eq!(key.to_string(), "vga_web1");
    }

    #[test]
    fn test_proxy_key_parse_keeps_underscores_in_instance() {
        let key: ProxyKey = "shell_my_box".parse().unwrap();
        assert_eq!(key.kind, SessionKind::Shell);
        assert_eq!(key.instance, "my_box");
    }

    #[test]
    fn test_proxy_key_parse_rejects_garbage() {
        assert!("web1".parse::<ProxyKey>().is_err());
        assert!("serial_web1".parse::<ProxyKey>().is_err());
        assert!("vga_".parse::<ProxyKey>().is_err());
    }

    #[test]
    fn test_instance_kind_accepts_cli_spelling() {
        assert_eq!(
            "VIRTUAL-MACHINE".parse::<InstanceKind>().unwrap(),
            InstanceKind::VirtualMachine
        );
        assert_eq!("CONTAINER".parse::<InstanceKind>().unwrap(), InstanceKind::Container);
        assert!("toaster".parse::<InstanceKind>().is_err());
    }

    #[test]
    fn test_default_session_kind() {
        let vm = Instance {
            name: "web1".into(),
            status: InstanceStatus::Running,
            kind: InstanceKind::VirtualMachine,
        };
        assert_eq!(vm.default_session_kind(), SessionKind::Vga);
        assert!(vm.is_running());

        let ct = Instance {
            name: "db1".into(),
            status: InstanceStatus::parse("STOPPED"),
            kind: InstanceKind::Container,
        };
        assert_eq!(ct.default_session_kind(), SessionKind::Shell);
        assert!(!ct.is_running());
    }
}
