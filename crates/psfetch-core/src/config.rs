//! Configuration parsing and validation.
//!
//! The plugin is configured from a TOML file naming the Gerrit remote, the
//! change to track and how the driver lands in the target tree:
//!
//! ```toml
//! [remote]
//! url = "https://review.opendev.org/openstack/cinder"
//! change = 617503
//!
//! [install]
//! target_dir = "/opt/stack/cinder"
//! work_dir = "/opt/stack/psfetch-work"
//! files = [
//!     "cinder/volume/drivers/quantastor.py",
//!     "cinder/volume/drivers/quantastor_api.py",
//! ]
//! marker_file = "/opt/stack/cinder/.psfetch-commit"
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::change::{ChangeNumber, DEFAULT_NAMESPACE};
use crate::remote::DEFAULT_LIST_TIMEOUT;

/// Top-level plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Where patchsets are looked up.
    pub remote: RemoteConfig,

    /// How the resolved patchset is installed.
    pub install: InstallConfig,
}

impl PluginConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or [`Self::validate`] fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `remote.url` is empty
    /// - `remote.namespace` is empty or ends with `/`
    /// - `install.mode = "copy"` with no `install.files`
    /// - `install.mode = "cherry-pick"` with `install.files`
    /// - a file entry is empty, absolute, or contains `..`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "remote.url must not be empty".to_string(),
            ));
        }

        let namespace = &self.remote.namespace;
        if namespace.is_empty() || namespace.ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "remote.namespace must be non-empty without a trailing '/', got {namespace:?}"
            )));
        }

        if self.install.mode == InstallMode::Copy && self.install.files.is_empty() {
            return Err(ConfigError::Validation(
                "install.files must list at least one file in copy mode".to_string(),
            ));
        }

        if self.install.mode == InstallMode::CherryPick && !self.install.files.is_empty() {
            return Err(ConfigError::Validation(
                "install.files is only used in copy mode; remove it for cherry-pick".to_string(),
            ));
        }

        for file in &self.install.files {
            validate_relative_path(file)?;
        }

        Ok(())
    }
}

fn validate_relative_path(file: &Path) -> Result<(), ConfigError> {
    if file.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "install.files entries must not be empty".to_string(),
        ));
    }

    let escapes = file
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ConfigError::Validation(format!(
            "install.files entry {} must be a relative path inside the tree",
            file.display()
        )));
    }
    Ok(())
}

/// Gerrit remote settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Address handed to `git ls-remote` and `git fetch`.
    pub url: String,

    /// Change whose latest patchset is installed.
    pub change: ChangeNumber,

    /// Ref namespace holding patchsets.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Upper bound on the listing query, in seconds. Zero disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    /// Listing timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Install settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    /// Source tree receiving the driver (e.g. the Cinder checkout).
    pub target_dir: PathBuf,

    /// Scratch repository the patchset is fetched into.
    pub work_dir: PathBuf,

    /// How the patchset reaches `target_dir`.
    #[serde(default)]
    pub mode: InstallMode,

    /// Files copied from the patchset, relative to the repository root.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// File receiving the short commit id of the installed patchset.
    #[serde(default)]
    pub marker_file: Option<PathBuf>,

    /// Abort when the change has no patchsets. When `false` a warning is
    /// logged and the install is skipped.
    #[serde(default = "default_fail_on_not_found")]
    pub fail_on_not_found: bool,
}

/// How a fetched patchset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMode {
    /// Copy the configured files into the target tree.
    #[default]
    Copy,
    /// Cherry-pick the patchset commit onto the target tree's checkout.
    CherryPick,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_LIST_TIMEOUT.as_secs()
}

const fn default_fail_on_not_found() -> bool {
    true
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
