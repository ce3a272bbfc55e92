//! Bridge process spawning

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use cs_core::{ProcessError, ProxyKey};

use super::command::BridgePlan;

/// A running bridge process
#[async_trait]
pub trait BridgeChild: Send {
    fn pid(&self) -> Option<u32>;

    /// Wait for exit, returning the exit code (None when killed by a signal).
    /// Must be cancel-safe.
    async fn wait(&mut self) -> Result<Option<i32>, ProcessError>;

    /// Ask the process to exit (SIGTERM)
    fn terminate(&mut self) -> Result<(), ProcessError>;

    /// Force the process down and reap it
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Launches bridge processes
pub trait BridgeSpawner: Send + Sync {
    fn spawn(&self, key: &ProxyKey, plan: &BridgePlan) -> Result<Box<dyn BridgeChild>, ProcessError>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct ProcessSpawner;

impl BridgeSpawner for ProcessSpawner {
    fn spawn(&self, key: &ProxyKey, plan: &BridgePlan) -> Result<Box<dyn BridgeChild>, ProcessError> {
        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: plan.program.display().to_string(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_lines(key.clone(), stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_lines(key.clone(), stderr, true));
        }

        Ok(Box::new(ProcessChild { child }))
    }
}

/// Log a bridge output stream line by line until it closes
async fn drain_lines<R>(key: ProxyKey, stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => tracing::warn!(key = %key, "bridge stderr: {}", line),
            Ok(Some(line)) => tracing::debug!(key = %key, "bridge stdout: {}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(key = %key, "bridge output closed: {}", e);
                break;
            }
        }
    }
}

struct ProcessChild {
    child: Child,
}

#[async_trait]
impl BridgeChild for ProcessChild {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        match self.child.id() {
            Some(pid) => Ok(cs_core::pidfile::terminate_process(pid)?),
            // Already reaped
            None => Ok(()),
        }
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        Ok(self.child.kill().await?)
    }
}
