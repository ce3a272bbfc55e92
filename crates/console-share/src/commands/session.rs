//! Foreground shell/console commands
//!
//! Runs a single supervised bridge in this process until Ctrl-C, without a
//! daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cs_core::{SessionError, SessionKind, ShareError};
use cs_proxy::{BridgeOutcome, ProxyState};

use super::load_share_config;
use super::signals::spawn_signal_handler;
use crate::output::{print_error, print_info, print_success};

/// Share `kind` of `instance` on a TCP port until Ctrl-C or SIGTERM.
///
/// Fails with [`ShareError::GivenUp`] when the bridge exhausts its retry
/// budget, so the process exits non-zero.
pub async fn session_command(
    config_path: Option<&PathBuf>,
    instance: &str,
    kind: SessionKind,
    port: Option<u16>,
) -> Result<()> {
    let config = load_share_config(config_path)?;
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;
    let state = ProxyState::new(config, cancel.clone());

    let target = state
        .instance(instance)
        .await
        .with_context(|| format!("Cannot open a {} on {}", kind, instance))?;
    if !target.is_running() {
        tracing::debug!("{} has status {}", instance, target.status);
        return Err(ShareError::from(SessionError::NotRunning(instance.to_string())).into());
    }

    let port = port
        .or_else(|| state.config.instances.get(instance).and_then(|p| p.port))
        .unwrap_or(state.config.start_port);

    let handle = state.start_detached(instance, Some(kind), Some(port)).await?;
    let key = handle.key().clone();
    print_success(&format!(
        "Sharing {} on {}:{} (Ctrl-C to stop)",
        key, state.config.bind_address, port
    ));

    let mut watch = handle.subscribe();
    let interrupted = tokio::select! {
        _ = cancel.cancelled() => true,
        _ = watch.wait_for(|s| s.state.is_terminal()) => false,
    };

    let outcome = if interrupted {
        print_info("Stopping...");
        handle.stop().await
    } else {
        handle.join().await
    };

    match outcome {
        BridgeOutcome::Stopped => {
            print_success(&format!("Stopped {}", key));
            Ok(())
        }
        BridgeOutcome::GivenUp {
            attempts,
            last_error,
        } => {
            print_error(&format!(
                "Giving up on {} after {} attempts",
                key, attempts
            ));
            Err(ShareError::GivenUp {
                key,
                attempts,
                last_error,
            }
            .into())
        }
    }
}
