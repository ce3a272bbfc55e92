//! Output formatting utilities for the CLI
//!
//! Tables for proxies and instances, the daemon status block, and coloured
//! status messages.

use std::collections::BTreeMap;

use tabled::{settings::Style, Table, Tabled};

use cs_core::config::InstanceProfile;
use cs_core::Instance;

use crate::ipc::{DaemonStatus, ProxyInfo};

/// Format supervised bridges as an ASCII table
///
/// Returns "No proxies running" when the list is empty.
pub fn format_proxies(proxies: &[ProxyInfo]) -> String {
    if proxies.is_empty() {
        return "No proxies running".to_string();
    }

    #[derive(Tabled)]
    struct ProxyRow {
        #[tabled(rename = "PROXY")]
        key: String,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "RETRIES")]
        attempts: u32,
        #[tabled(rename = "LAST ERROR")]
        last_error: String,
    }

    let rows: Vec<ProxyRow> = proxies
        .iter()
        .map(|p| ProxyRow {
            key: p.key.to_string(),
            kind: p.kind.to_string(),
            port: p.port,
            state: p.state.clone(),
            pid: p
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
            attempts: p.attempts,
            last_error: p
                .last_error
                .as_deref()
                .map(|e| truncate(e, 48))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format an instance listing, joined with the configured mappings
pub fn format_instances(
    instances: &[Instance],
    mappings: &BTreeMap<String, InstanceProfile>,
) -> String {
    if instances.is_empty() {
        return "No instances found".to_string();
    }

    #[derive(Tabled)]
    struct InstanceRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "SESSION")]
        session: String,
        #[tabled(rename = "PORT")]
        port: String,
    }

    let rows: Vec<InstanceRow> = instances
        .iter()
        .map(|i| {
            let profile = mappings.get(&i.name);
            InstanceRow {
                name: i.name.clone(),
                status: i.status.to_string(),
                kind: i.kind.to_string(),
                session: profile
                    .and_then(|p| p.kind)
                    .unwrap_or_else(|| i.default_session_kind())
                    .to_string(),
                port: profile
                    .and_then(|p| p.port)
                    .map(|port| port.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format daemon status as a human-readable string
pub fn format_status(status: &DaemonStatus) -> String {
    let mut output = String::new();

    output.push_str("Daemon Status: Running\n");
    output.push_str(&format!("Version: {}\n", status.version));
    output.push_str(&format!("PID: {}\n", status.pid));
    output.push_str(&format!(
        "Uptime: {}\n",
        format_duration(status.uptime_secs)
    ));
    output.push_str(&format!("Remote: {}\n", status.remote));
    output.push_str(&format!("Project: {}\n", status.project));
    output.push_str(&format!("Active Proxies: {}\n", status.proxy_count));

    output
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        format!("{}m {}s", mins, remaining_secs)
    } else if secs < 86400 {
        let hours = secs / 3600;
        let remaining_mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, remaining_mins)
    } else {
        let days = secs / 86400;
        let remaining_hours = (secs % 86400) / 3600;
        format!("{}d {}h", days, remaining_hours)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix, to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_core::{InstanceKind, InstanceStatus, ProxyKey, SessionKind};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long message", 10), "a rathe...");
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(format_proxies(&[]), "No proxies running");
        assert_eq!(
            format_instances(&[], &BTreeMap::new()),
            "No instances found"
        );
    }

    #[test]
    fn test_proxy_table() {
        let proxies = vec![ProxyInfo {
            key: ProxyKey::new("web1", SessionKind::Vga),
            kind: SessionKind::Vga,
            pid: None,
            state: "retrying".to_string(),
            port: 8001,
            attempts: 2,
            last_error: Some("HTTP 500: boom".to_string()),
        }];

        let table = format_proxies(&proxies);
        assert!(table.contains("vga_web1"));
        assert!(table.contains("8001"));
        assert!(table.contains("retrying"));
        assert!(table.contains("HTTP 500: boom"));
    }

    #[test]
    fn test_instance_table_uses_mapping() {
        let instances = vec![
            Instance {
                name: "web1".to_string(),
                status: InstanceStatus::Running,
                kind: InstanceKind::VirtualMachine,
            },
            Instance {
                name: "db1".to_string(),
                status: InstanceStatus::Stopped,
                kind: InstanceKind::Container,
            },
        ];
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "db1".to_string(),
            InstanceProfile::new(SessionKind::Console, 8002),
        );

        let table = format_instances(&instances, &mappings);
        assert!(table.contains("web1"));
        assert!(table.contains("vga"));
        assert!(table.contains("console"));
        assert!(table.contains("8002"));
    }
}
