//! List command implementation

use anyhow::Result;

use crate::ipc::DaemonClient;
use crate::output::{format_proxies, print_error};

/// Execute the list command
pub async fn list_command(client: &mut DaemonClient) -> Result<()> {
    let proxies = match client.list_proxies().await {
        Ok(p) => p,
        Err(e) => {
            print_error(&format!("Failed to list proxies: {}", e));
            return Err(e);
        }
    };

    println!("Proxies:");
    println!("{}", format_proxies(&proxies));

    Ok(())
}
