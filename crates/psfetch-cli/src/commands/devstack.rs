//! `psfetch devstack <mode> [<phase>]`: DevStack plugin hook.
//!
//! DevStack calls the plugin for every mode and phase. Only `stack install`
//! does any work; the configuration file is not read otherwise, so a host
//! without one can still run `unstack` or `clean`.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use psfetch_core::phase::{PhaseDecision, decide};
use tracing::debug;

use super::ConfigOverrides;
use super::install::InstallArgs;

/// Arguments for `psfetch devstack`.
#[derive(Args, Debug)]
pub struct DevstackArgs {
    /// Mode DevStack is running (`stack`, `unstack`, `clean`, `source`)
    pub mode: String,

    /// Phase within the mode (`pre-install`, `install`, `post-config`, ...)
    pub phase: Option<String>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Warn and exit successfully when the change has no patchsets
    #[arg(long)]
    pub allow_missing: bool,
}

/// Runs the install when DevStack is at `stack install`.
///
/// # Errors
///
/// Returns an error if the install runs and fails.
pub fn run(config_path: &Path, args: &DevstackArgs) -> Result<()> {
    let decision = decide(&args.mode, args.phase.as_deref());
    debug!(mode = %args.mode, phase = ?args.phase, %decision, "devstack hook");

    match decision {
        PhaseDecision::Install => super::install::run(
            config_path,
            &InstallArgs {
                overrides: args.overrides.clone(),
                allow_missing: args.allow_missing,
            },
        ),
        PhaseDecision::Skip => Ok(()),
    }
}
