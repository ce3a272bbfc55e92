//! Commands that drive bridges in a running daemon

use anyhow::Result;

use cs_core::SessionKind;

use crate::ipc::DaemonClient;
use crate::output::{print_error, print_success, print_warning};

/// Ask the daemon to start a bridge
pub async fn start_command(
    client: &mut DaemonClient,
    instance: &str,
    kind: Option<SessionKind>,
    port: Option<u16>,
) -> Result<()> {
    match client.start_proxy(instance, kind, port).await {
        Ok((key, port)) => {
            print_success(&format!("Started {} on port {}", key, port));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to start proxy for {}: {}", instance, e));
            Err(e)
        }
    }
}

/// Stop bridges for an instance; all kinds when `kind` is None
pub async fn stop_command(
    client: &mut DaemonClient,
    instance: &str,
    kind: Option<SessionKind>,
) -> Result<()> {
    let keys = client.stop_proxy(instance, kind).await?;

    if keys.is_empty() {
        let what = kind.map(|k| k.to_string()).unwrap_or_else(|| "any".to_string());
        print_warning(&format!("No {} proxy running for {}", what, instance));
        return Ok(());
    }

    for key in keys {
        print_success(&format!("Stopped {}", key));
    }
    Ok(())
}

/// Stop the daemon and every bridge it supervises
pub async fn shutdown_command(client: &mut DaemonClient) -> Result<()> {
    if !client.ping().await.unwrap_or(false) {
        print_warning("Daemon is not running");
        return Ok(());
    }

    client.shutdown().await?;
    print_success("Daemon stopped");
    Ok(())
}
