//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cs_core::config::{self, generate_config};
use cs_proxy::ProxyState;

use super::load_share_config;
use crate::output::{print_error, print_info, print_success};

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Print the effective configuration as TOML
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);
    let config = load_share_config(config_path)?;

    if !path.exists() {
        print_info(&format!("No config file at {:?}, showing defaults", path));
    }
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render config")?
    );
    Ok(())
}

/// Print the config file location
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Write a config mapping every instance on the remote to a port
///
/// Virtual machines get VGA, containers get a shell. An existing file is
/// only replaced with `force`.
pub async fn config_generate(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    let base = if path.exists() {
        load_share_config(Some(&path))?
    } else {
        Default::default()
    };
    let state = ProxyState::new(base, CancellationToken::new());
    let instances = state
        .instances()
        .await
        .with_context(|| format!("Failed to list instances on {}", state.config.remote))?;

    let generated = generate_config(&instances, &state.config);
    config::save_config(&path, &generated)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!(
        "Wrote {} instance mappings to {:?}",
        generated.instances.len(),
        path
    ));
    for (name, profile) in &generated.instances {
        if let (Some(kind), Some(port)) = (profile.kind, profile.port) {
            print_info(&format!("  {:<20} {:<8} {}", name, kind.as_str(), port));
        }
    }
    Ok(())
}
