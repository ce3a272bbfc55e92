//! Status command implementation

use anyhow::Result;

use crate::ipc::DaemonClient;
use crate::output::{format_status, print_info, print_warning};

/// Execute the status command
///
/// A daemon that is not running is reported, not treated as an error.
pub async fn status_command(client: &mut DaemonClient) -> Result<()> {
    if !client.ping().await.unwrap_or(false) {
        print_warning(&format!("Daemon is not running (IPC {})", client.address()));
        print_info("Start it with: console-share serve");
        return Ok(());
    }

    let status = client.status().await?;
    println!("{}", format_status(&status));

    Ok(())
}
