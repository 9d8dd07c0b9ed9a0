//! Subcommand implementations.

pub mod devstack;
pub mod install;
pub mod resolve;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use psfetch_core::change::ChangeNumber;
use psfetch_core::config::PluginConfig;

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Change number to track instead of `remote.change`
    #[arg(long)]
    pub change: Option<ChangeNumber>,

    /// Remote address to query instead of `remote.url`
    #[arg(long)]
    pub remote: Option<String>,
}

/// Loads the configuration file and applies `overrides`.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result fails
/// validation.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<PluginConfig> {
    let mut config = PluginConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(change) = overrides.change {
        config.remote.change = change;
    }
    if let Some(remote) = &overrides.remote {
        config.remote.url.clone_from(remote);
    }

    config
        .validate()
        .context("Invalid configuration after applying command-line overrides")?;
    Ok(config)
}
