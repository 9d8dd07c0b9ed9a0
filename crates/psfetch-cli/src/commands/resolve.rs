//! `psfetch resolve`: print the latest patchset of the configured change.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;
use psfetch_core::install::Installer;
use psfetch_core::resolver::Resolution;

use super::{ConfigOverrides, load_config};

/// Arguments for `psfetch resolve`.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Prints `<ref> <commit>` for the latest patchset.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, resolution fails
/// or the change has no patchsets.
pub fn run(config_path: &Path, args: &ResolveArgs) -> Result<()> {
    let config = load_config(config_path, &args.overrides)?;
    let change = config.remote.change;

    let resolution = Installer::for_config(&config)
        .resolve(&config)
        .with_context(|| format!("Failed to resolve the latest patchset of change {change}"))?;

    match resolution {
        Resolution::Found(latest) => {
            println!("{} {}", latest.name, latest.commit);
            Ok(())
        },
        Resolution::NotFound => bail!(
            "No patchsets found for change {change} on {}",
            config.remote.url
        ),
    }
}
