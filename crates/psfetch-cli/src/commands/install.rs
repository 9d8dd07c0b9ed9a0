//! `psfetch install`: fetch the latest patchset and install the driver.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use psfetch_core::config::PluginConfig;
use psfetch_core::install::{InstallOutcome, Installer};

use super::{ConfigOverrides, load_config};

/// Arguments for `psfetch install`.
#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Warn and exit successfully when the change has no patchsets
    #[arg(long)]
    pub allow_missing: bool,
}

/// Loads configuration and runs the install workflow.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the install
/// fails.
pub fn run(config_path: &Path, args: &InstallArgs) -> Result<()> {
    let mut config = load_config(config_path, &args.overrides)?;
    if args.allow_missing {
        config.install.fail_on_not_found = false;
    }
    install(&config)
}

/// Runs the install workflow for an already loaded configuration.
///
/// # Errors
///
/// Returns an error if the install fails.
pub fn install(config: &PluginConfig) -> Result<()> {
    let change = config.remote.change;
    let outcome = Installer::for_config(config)
        .run(config)
        .with_context(|| format!("Failed to install the latest patchset of change {change}"))?;

    println!("{}", summarize(&outcome));
    Ok(())
}

fn summarize(outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::Installed {
            patchset,
            short_commit,
            files,
        } => format!(
            "Installed {} ({short_commit}), {} file(s) updated",
            patchset.name,
            files.len()
        ),
        InstallOutcome::Skipped { change } => {
            format!("No patchsets for change {change}, nothing installed")
        },
    }
}
