//! Per-instance proxy mappings

use serde::{Deserialize, Serialize};

use super::ShareConfig;
use crate::types::{Instance, SessionKind};

/// Proxy mapping for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProfile {
    /// Session kind to expose (None = classify at start)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SessionKind>,

    /// TCP port the bridge listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Whether `serve` starts this mapping
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Remote override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Project override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for InstanceProfile {
    fn default() -> Self {
        Self {
            kind: None,
            port: None,
            enabled: true,
            remote: None,
            project: None,
        }
    }
}

impl InstanceProfile {
    /// Create an enabled mapping
    pub fn new(kind: SessionKind, port: u16) -> Self {
        Self {
            kind: Some(kind),
            port: Some(port),
            ..Default::default()
        }
    }
}

/// Build a configuration from an instance listing.
///
/// Virtual machines map to VGA consoles, containers to shells. Ports are
/// handed out sequentially from `base.start_port` in name order.
pub fn generate_config(instances: &[Instance], base: &ShareConfig) -> ShareConfig {
    let mut config = base.clone();
    config.instances.clear();

    let mut sorted: Vec<&Instance> = instances.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for (offset, instance) in sorted.into_iter().enumerate() {
        let port = base.start_port.saturating_add(offset as u16);
        config.instances.insert(
            instance.name.clone(),
            InstanceProfile::new(instance.default_session_kind(), port),
        );
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstanceKind, InstanceStatus};

    fn instance(name: &str, kind: InstanceKind) -> Instance {
        Instance {
            name: name.to_string(),
            status: InstanceStatus::Running,
            kind,
        }
    }

    #[test]
    fn test_generate_assigns_kinds_and_ports() {
        let instances = vec![
            instance("web1", InstanceKind::VirtualMachine),
            instance("db1", InstanceKind::Container),
        ];

        let config = generate_config(&instances, &ShareConfig::default());

        assert_eq!(config.instances.len(), 2);
        assert_eq!(
            config.instances["db1"],
            InstanceProfile::new(SessionKind::Shell, 8000)
        );
        assert_eq!(
            config.instances["web1"],
            InstanceProfile::new(SessionKind::Vga, 8001)
        );
    }

    #[test]
    fn test_generate_replaces_existing_mappings() {
        let mut base = ShareConfig::default();
        base.instances
            .insert("gone".into(), InstanceProfile::new(SessionKind::Console, 9000));

        let config = generate_config(&[], &base);
        assert!(config.instances.is_empty());
        assert_eq!(config.remote, base.remote);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let profile: InstanceProfile = toml::from_str("port = 8005").unwrap();
        assert!(profile.enabled);
        assert_eq!(profile.kind, None);
    }
}
