//! Instances command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cs_proxy::ProxyState;

use super::load_share_config;
use crate::output::format_instances;

/// List instances on the configured remote with their mapped session and port
pub async fn instances_command(config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_share_config(config_path)?;
    let state = ProxyState::new(config, CancellationToken::new());

    let instances = state
        .instances()
        .await
        .with_context(|| format!("Failed to list instances on {}", state.config.remote))?;

    println!(
        "Instances ({}, project {}):",
        state.config.remote, state.config.project
    );
    println!("{}", format_instances(&instances, &state.config.instances));
    Ok(())
}
