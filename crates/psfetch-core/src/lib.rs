//! psfetch-core - Gerrit patchset resolution and driver installation.
//!
//! This crate implements the logic behind the `psfetch` DevStack plugin:
//! find the newest patchset of a Gerrit change and install the driver it
//! carries into a Cinder source tree.
//!
//! # Modules
//!
//! - [`change`] - change numbers, shards and patchset refs
//! - [`remote`] - listing refs of a remote (`git ls-remote`)
//! - [`resolver`] - selecting the latest patchset
//! - [`config`] - TOML configuration
//! - [`phase`] - the DevStack `stack install` gate
//! - [`install`] - fetch, copy or cherry-pick, and marker file

pub mod change;
pub mod config;
pub mod install;
pub mod phase;
pub mod remote;
pub mod resolver;

pub use change::{ChangeNumber, PatchsetRef};
pub use config::PluginConfig;
pub use install::{InstallError, InstallOutcome, Installer};
pub use resolver::{Resolution, ResolveError, resolve_latest_patchset};
