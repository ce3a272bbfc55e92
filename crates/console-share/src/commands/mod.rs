//! CLI command implementations

mod config;
mod instances;
mod list;
mod serve;
mod session;
mod signals;
mod status;
mod stop;

pub use config::{config_generate, config_path, config_show};
pub use instances::instances_command;
pub use list::list_command;
pub use serve::serve_command;
pub use session::session_command;
pub use status::status_command;
pub use stop::{shutdown_command, start_command, stop_command};

use std::path::PathBuf;

use anyhow::{Context, Result};

use cs_core::config::{self as core_config, ShareConfig};

/// Load the configuration from `path`, or from the default location.
///
/// An explicit path must exist; the default path falls back to defaults.
pub fn load_share_config(path: Option<&PathBuf>) -> Result<ShareConfig> {
    match path {
        Some(path) => core_config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let path = core_config::default_config_path();
            core_config::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))
        }
    }
}
