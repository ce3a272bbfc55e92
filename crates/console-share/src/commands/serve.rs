//! Daemon (serve) implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use cs_core::pidfile::{default_pid_path, running_daemon_pid, PidFileGuard};
use cs_proxy::ipc::IpcServer;
use cs_proxy::{BridgeEvent, BridgeOutcome, ProxyState};

use super::load_share_config;
use super::signals::spawn_signal_handler;
use crate::output::{print_info, print_success, print_warning};

/// Start the daemon, in the background unless `foreground` is set
pub async fn serve_command(config_path: Option<&PathBuf>, foreground: bool) -> Result<()> {
    let pid_path = default_pid_path();
    if let Some(pid) = running_daemon_pid(&pid_path)? {
        print_warning(&format!("Daemon already running (PID: {})", pid));
        return Ok(());
    }

    if !foreground {
        // Daemonize by re-spawning ourselves
        let exe = std::env::current_exe()?;
        let mut cmd = std::process::Command::new(exe);
        cmd.arg("serve").arg("--foreground");
        if let Some(path) = config_path {
            cmd.arg("--config").arg(path);
        }

        let child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to start daemon")?;

        print_success(&format!("Daemon started (PID: {})", child.id()));
        return Ok(());
    }

    run_daemon(config_path, pid_path).await
}

async fn run_daemon(config_path: Option<&PathBuf>, pid_path: PathBuf) -> Result<()> {
    tracing::info!("console-share daemon starting...");

    let config = load_share_config(config_path)?;
    let _pid_guard = PidFileGuard::new(pid_path, std::process::id())
        .context("Failed to write PID file")?;

    // Bind first so a second daemon fails fast
    let ipc_address = config.ipc_address();
    let listener = TcpListener::bind(&ipc_address)
        .await
        .with_context(|| format!("Failed to bind IPC server to {}", ipc_address))?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let state = Arc::new(ProxyState::new(config, cancel.clone()));
    spawn_outcome_logger(&state);

    let ipc_server = IpcServer::new(ipc_address.clone(), Arc::clone(&state));
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.serve(listener).await {
            tracing::error!("IPC server error: {}", e);
        }
    });

    tokio::select! {
        started = state.start_enabled() => {
            print_info(&format!(
                "Serving {} proxies from {} (IPC {})",
                started, state.config.remote, ipc_address
            ));
        }
        _ = cancel.cancelled() => {}
    }

    cancel.cancelled().await;
    tracing::info!("Shutting down, stopping all proxies...");
    state.shutdown().await;
    let _ = ipc_handle.await;

    tracing::info!("Daemon shutdown complete");
    Ok(())
}

/// Surface bridges that exhausted their retry budget
fn spawn_outcome_logger(state: &ProxyState) {
    let mut events = state.registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BridgeEvent::Finished {
                    key,
                    outcome:
                        BridgeOutcome::GivenUp {
                            attempts,
                            last_error,
                        },
                }) => {
                    tracing::error!(
                        key = %key,
                        attempts,
                        "Proxy given up, restart it with `console-share start`: {}",
                        last_error
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Outcome logger skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
