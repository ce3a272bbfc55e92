//! `incus` command-line session broker

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use cs_core::config::{CaptureConfig, ShellConfig};
use cs_core::{
    Instance, InstanceKind, InstanceStatus, InterceptionError, SessionError, SessionKind,
    ShareError,
};

use super::{ConsoleSession, SessionBroker};
use crate::shim::{await_capture, CaptureShim, CapturedSocket};

/// Negotiates sessions by driving the `incus` CLI
pub struct CliBroker {
    incus: PathBuf,
    shell: ShellConfig,
    capture: CaptureConfig,
}

impl CliBroker {
    pub fn new(incus: PathBuf, shell: ShellConfig, capture: CaptureConfig) -> Self {
        Self {
            incus,
            shell,
            capture,
        }
    }

    fn program(&self) -> String {
        self.incus.display().to_string()
    }

    /// Run `incus` to completion and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String, SessionError> {
        let command = format!("{} {}", self.program(), args.join(" "));
        tracing::debug!("Running {}", command);

        let output = Command::new(&self.incus)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SessionError::Cli {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SessionError::Cli {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list(&self, project: &str, filter: Option<&str>) -> Result<Vec<Instance>, SessionError> {
        let mut args = vec!["list", "--format", "csv", "--columns", "nst", "--project", project];
        if let Some(name) = filter {
            args.push(name);
        }
        Ok(parse_instance_list(&self.run(&args).await?))
    }

    /// Launch the console or shell command for `kind`.
    ///
    /// Text kinds become an exec target for the bridge; VGA spawns the
    /// console client now and captures the socket it negotiates.
    pub async fn open_local_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError> {
        let program = self.program();
        let argv = match kind {
            SessionKind::Shell => vec![
                program,
                "exec".to_string(),
                instance.to_string(),
                "--project".to_string(),
                project.to_string(),
                "--env".to_string(),
                format!("TERM={}", self.shell.term),
                "--".to_string(),
                self.shell.command.clone(),
            ],
            SessionKind::Console => vec![
                program,
                "console".to_string(),
                instance.to_string(),
                "--project".to_string(),
                project.to_string(),
            ],
            SessionKind::Vga => {
                let socket = self.capture_vga_socket(instance, project).await?;
                return Ok(ConsoleSession::LocalSocket(socket));
            }
        };
        Ok(ConsoleSession::LocalExec { argv })
    }

    async fn capture_vga_socket(
        &self,
        instance: &str,
        project: &str,
    ) -> Result<CapturedSocket, ShareError> {
        let shim = CaptureShim::install_capture(&self.capture.base_dir)?;

        let mut client = Command::new(&self.incus)
            .args(["console", "--type=vga", instance, "--project", project])
            .env("PATH", shim.search_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Cli {
                command: format!("{} console --type=vga {}", self.program(), instance),
                stderr: e.to_string(),
            })?;

        enum Race {
            Captured(Result<PathBuf, InterceptionError>),
            ClientExited(std::io::Result<ExitStatus>),
        }

        let log_path = shim.log_path();
        let race = tokio::select! {
            biased;
            captured = await_capture(&log_path, self.capture.timeout, self.capture.poll_interval) => {
                Race::Captured(captured)
            }
            status = client.wait() => Race::ClientExited(status),
        };

        match race {
            Race::Captured(captured) => {
                let path = captured?;
                tracing::info!("Captured VGA socket for {}: {:?}", instance, path);
                Ok(CapturedSocket::new(path, Some(client)))
            }
            Race::ClientExited(status) => {
                let code = status.ok().and_then(|s| s.code());
                Err(InterceptionError::ClientExited { code }.into())
            }
        }
    }
}

/// Parse `incus list --format csv --columns nst` output.
///
/// Rows that do not carry a known instance type are skipped.
pub fn parse_instance_list(output: &str) -> Vec<Instance> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let name = fields.next().filter(|n| !n.is_empty())?;
            let status = fields.next()?;
            let kind: InstanceKind = fields.next()?.parse().ok()?;
            Some(Instance {
                name: name.to_string(),
                status: InstanceStatus::parse(status),
                kind,
            })
        })
        .collect()
}

#[async_trait]
impl SessionBroker for CliBroker {
    async fn classify(&self, instance: &str, project: &str) -> SessionKind {
        match self.get_instance(instance, project).await {
            Ok(found) if found.kind == InstanceKind::VirtualMachine => SessionKind::Vga,
            Ok(_) => SessionKind::Console,
            Err(e) => {
                tracing::warn!(
                    "Failed to look up {}, falling back to text console: {}",
                    instance,
                    e
                );
                SessionKind::Console
            }
        }
    }

    async fn open_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError> {
        self.open_local_session(instance, project, kind).await
    }

    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>, ShareError> {
        Ok(self.list(project, None).await?)
    }

    async fn get_instance(&self, name: &str, project: &str) -> Result<Instance, ShareError> {
        // `incus list <name>` is a prefix filter
        self.list(project, Some(name))
            .await?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| SessionError::InstanceNotFound(name.to_string()).into())
    }
}
