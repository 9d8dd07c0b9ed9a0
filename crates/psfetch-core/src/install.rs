//! Driver installation workflow.
//!
//! Runs the whole provisioning step for one configured change:
//!
//! 1. Resolve the latest patchset (see [`crate::resolver`]).
//! 2. Apply the not-found policy (`install.fail_on_not_found`).
//! 3. Fetch the patchset into the scratch repository and check it out.
//! 4. Copy the driver files into the target tree, or cherry-pick the
//!    patchset onto it.
//! 5. Record the short commit id in the marker file.
//!
//! Nothing touches the filesystem before step 3, so a failed resolution
//! leaves both trees as they were. A failed cherry-pick is aborted before
//! the error is returned.
//!
//! The remote address is pinned once (see [`pin_remote`]) and the same
//! address is listed and fetched, although the fetches run from other
//! directories.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use xshell::{Shell, cmd};

use crate::change::{ChangeNumber, PatchsetRef};
use crate::config::{InstallConfig, InstallMode, PluginConfig};
use crate::remote::{GitLsRemote, RefLister};
use crate::resolver::{PatchsetResolver, Resolution, ResolveError};

/// Errors that abort an install.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// Resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The change has no patchsets and the policy makes that fatal.
    #[error("no patchsets found for change {change} on {remote}")]
    PatchsetNotFound {
        /// Change that was looked up.
        change: ChangeNumber,
        /// Remote that was queried.
        remote: String,
    },

    /// A git command or file operation failed.
    #[error("failed to {action}")]
    Shell {
        /// What was being attempted.
        action: String,
        /// Underlying failure.
        #[source]
        source: xshell::Error,
    },

    /// The fetched commit differs from the one the remote advertised.
    #[error("fetched {fetched} for {ref_name}, but the remote advertised {advertised}")]
    CommitMismatch {
        /// Ref that was fetched.
        ref_name: String,
        /// Commit from the listing.
        advertised: String,
        /// Commit `FETCH_HEAD` points to.
        fetched: String,
    },

    /// A configured driver file is not part of the patchset.
    #[error("driver file {} is not present in {ref_name}", .path.display())]
    MissingDriverFile {
        /// Path relative to the repository root.
        path: PathBuf,
        /// Patchset that was checked out.
        ref_name: String,
    },
}

fn shell_err(action: impl Into<String>) -> impl FnOnce(xshell::Error) -> InstallError {
    let action = action.into();
    move |source| InstallError::Shell { action, source }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The patchset was installed.
    Installed {
        /// The installed patchset.
        patchset: PatchsetRef,
        /// Abbreviated commit id, as written to the marker file.
        short_commit: String,
        /// Files written or changed in the target tree, relative to it.
        files: Vec<PathBuf>,
    },
    /// The change has no patchsets; nothing was installed.
    Skipped {
        /// Change that was looked up.
        change: ChangeNumber,
    },
}

/// Installs the latest patchset of a change into a source tree.
#[derive(Debug, Clone)]
pub struct Installer<L> {
    lister: L,
}

impl Installer<GitLsRemote> {
    /// Creates an installer listing refs with `git ls-remote`, using the
    /// timeout from `config`.
    #[must_use]
    pub fn for_config(config: &PluginConfig) -> Self {
        Self::new(GitLsRemote::new().with_timeout(config.remote.timeout()))
    }
}

impl<L: RefLister> Installer<L> {
    /// Creates an installer over `lister`.
    #[must_use]
    pub const fn new(lister: L) -> Self {
        Self { lister }
    }

    /// Resolves the latest patchset of the configured change without
    /// installing anything.
    ///
    /// # Errors
    ///
    /// See [`PatchsetResolver::resolve`].
    pub fn resolve(&self, config: &PluginConfig) -> Result<Resolution, ResolveError> {
        self.resolve_at(config, &pin_remote(&config.remote.url))
    }

    fn resolve_at(&self, config: &PluginConfig, url: &str) -> Result<Resolution, ResolveError> {
        PatchsetResolver::new(&self.lister)
            .with_namespace(config.remote.namespace.as_str())
            .resolve(url, config.remote.change)
    }

    /// Runs the install workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - resolution fails (remote unreachable, malformed or duplicate refs)
    /// - the change has no patchsets and `fail_on_not_found` is set
    /// - a git command or file operation fails
    /// - a configured driver file is missing from the patchset
    pub fn run(&self, config: &PluginConfig) -> Result<InstallOutcome, InstallError> {
        let change = config.remote.change;
        let url = pin_remote(&config.remote.url);

        let latest = match self.resolve_at(config, &url)? {
            Resolution::Found(latest) => latest,
            Resolution::NotFound if config.install.fail_on_not_found => {
                return Err(InstallError::PatchsetNotFound {
                    change,
                    remote: config.remote.url.clone(),
                });
            },
            Resolution::NotFound => {
                warn!(
                    %change,
                    remote = %config.remote.url,
                    "no patchsets found, skipping driver install"
                );
                return Ok(InstallOutcome::Skipped { change });
            },
        };

        let sh = Shell::new().map_err(shell_err("create shell"))?;
        let install = &config.install;

        let short_commit = fetch_into_work_dir(&sh, &url, &latest, install)?;

        let files = match install.mode {
            InstallMode::Copy => copy_driver_files(&sh, &latest, install)?,
            InstallMode::CherryPick => cherry_pick(&sh, &url, &latest, install)?,
        };

        if let Some(marker) = &install.marker_file {
            write_marker(&sh, marker, &short_commit)?;
        }

        info!(
            %change,
            patchset = latest.patchset,
            commit = %short_commit,
            files = files.len(),
            "installed driver patchset"
        );

        Ok(InstallOutcome::Installed {
            patchset: latest,
            short_commit,
            files,
        })
    }
}

/// Pins `url` to the address every later step uses, whichever directory the
/// step runs in.
///
/// An existing local path becomes absolute. A bare remote name configured in
/// the repository around the current directory is replaced by its URL.
/// Anything else is returned unchanged.
#[must_use]
pub fn pin_remote(url: &str) -> String {
    let path = Path::new(url);
    if !url.is_empty() && path.exists() {
        return std::path::absolute(path)
            .map_or_else(|_| url.to_string(), |p| p.to_string_lossy().into_owned());
    }

    if url.is_empty() || url.contains(['/', ':', '\\']) {
        return url.to_string();
    }

    Shell::new()
        .ok()
        .and_then(|sh| {
            cmd!(sh, "git remote get-url {url}")
                .quiet()
                .ignore_stderr()
                .read()
                .ok()
        })
        .filter(|resolved| !resolved.is_empty())
        .map_or_else(|| url.to_string(), |resolved| pin_remote_url(&resolved))
}

// A remote configured as a relative path is relative to the repository,
// which `git remote get-url` does not resolve; leave those untouched.
fn pin_remote_url(resolved: &str) -> String {
    let path = Path::new(resolved);
    if path.is_absolute() || resolved.contains("://") || !path.exists() {
        return resolved.to_string();
    }
    std::path::absolute(path)
        .map_or_else(|_| resolved.to_string(), |p| p.to_string_lossy().into_owned())
}

/// Fetches `latest` into the work directory, checks it out detached and
/// returns its abbreviated commit id.
fn fetch_into_work_dir(
    sh: &Shell,
    url: &str,
    latest: &PatchsetRef,
    install: &InstallConfig,
) -> Result<String, InstallError> {
    let work_dir = &install.work_dir;
    sh.create_dir(work_dir)
        .map_err(shell_err(format!("create {}", work_dir.display())))?;
    let _dir = sh.push_dir(work_dir);

    if !sh.path_exists(".git") {
        debug!(path = %work_dir.display(), "initialising work repository");
        cmd!(sh, "git init --quiet")
            .quiet()
            .run()
            .map_err(shell_err(format!("initialise {}", work_dir.display())))?;
    }

    let ref_name = latest.name.as_str();
    debug!(url, ref_name, "fetching patchset");
    cmd!(sh, "git fetch --quiet {url} {ref_name}")
        .env("GIT_TERMINAL_PROMPT", "0")
        .quiet()
        .run()
        .map_err(shell_err(format!("fetch {ref_name}")))?;

    let fetched = cmd!(sh, "git rev-parse FETCH_HEAD")
        .quiet()
        .read()
        .map_err(shell_err("read FETCH_HEAD"))?;
    if fetched != latest.commit {
        return Err(InstallError::CommitMismatch {
            ref_name: latest.name.clone(),
            advertised: latest.commit.clone(),
            fetched,
        });
    }

    cmd!(sh, "git checkout --quiet --detach FETCH_HEAD")
        .quiet()
        .run()
        .map_err(shell_err(format!("check out {ref_name}")))?;

    cmd!(sh, "git rev-parse --short FETCH_HEAD")
        .quiet()
        .read()
        .map_err(shell_err("abbreviate FETCH_HEAD"))
}

/// Copies the configured files from the work directory into the target
/// tree. Every source is checked before anything is written.
fn copy_driver_files(
    sh: &Shell,
    latest: &PatchsetRef,
    install: &InstallConfig,
) -> Result<Vec<PathBuf>, InstallError> {
    if let Some(missing) = install
        .files
        .iter()
        .find(|file| !install.work_dir.join(file).is_file())
    {
        return Err(InstallError::MissingDriverFile {
            path: missing.clone(),
            ref_name: latest.name.clone(),
        });
    }

    for file in &install.files {
        let src = install.work_dir.join(file);
        let dst = install.target_dir.join(file);
        if let Some(parent) = dst.parent() {
            sh.create_dir(parent)
                .map_err(shell_err(format!("create {}", parent.display())))?;
        }
        debug!(src = %src.display(), dst = %dst.display(), "copying driver file");
        sh.copy_file(&src, &dst)
            .map_err(shell_err(format!("copy {}", file.display())))?;
    }

    Ok(install.files.clone())
}

/// Cherry-picks `latest` onto the target tree and returns the paths it
/// touched.
fn cherry_pick(
    sh: &Shell,
    url: &str,
    latest: &PatchsetRef,
    install: &InstallConfig,
) -> Result<Vec<PathBuf>, InstallError> {
    let target_dir = &install.target_dir;
    let _dir = sh.push_dir(target_dir);
    let ref_name = latest.name.as_str();

    cmd!(sh, "git fetch --quiet {url} {ref_name}")
        .env("GIT_TERMINAL_PROMPT", "0")
        .quiet()
        .run()
        .map_err(shell_err(format!("fetch {ref_name} into {}", target_dir.display())))?;

    // A failed pick leaves CHERRY_PICK_HEAD and conflict markers behind,
    // which would block the next run; put the tree back first.
    if let Err(source) = cmd!(sh, "git cherry-pick FETCH_HEAD").quiet().run() {
        warn!(ref_name, path = %target_dir.display(), "cherry-pick failed, aborting it");
        let _ = cmd!(sh, "git cherry-pick --abort")
            .quiet()
            .ignore_status()
            .ignore_stderr()
            .run();
        return Err(InstallError::Shell {
            action: format!("cherry-pick {ref_name}"),
            source,
        });
    }

    let changed = cmd!(sh, "git diff-tree --no-commit-id --name-only -r HEAD")
        .quiet()
        .read()
        .map_err(shell_err("list cherry-picked files"))?;

    Ok(changed.lines().map(PathBuf::from).collect())
}

fn write_marker(sh: &Shell, marker: &Path, short_commit: &str) -> Result<(), InstallError> {
    debug!(path = %marker.display(), commit = short_commit, "writing commit marker");
    sh.write_file(marker, format!("{short_commit}\n"))
        .map_err(shell_err(format!("write {}", marker.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::remote::{RemoteRef, StaticRefLister};

    fn config(root: &Path, fail_on_not_found: bool) -> PluginConfig {
        PluginConfig {
            remote: RemoteConfig {
                url: "https://review.example.org/openstack/cinder".to_string(),
                change: ChangeNumber::new(617_503),
                namespace: "refs/changes".to_string(),
                timeout_secs: 5,
            },
            install: InstallConfig {
                target_dir: root.join("cinder"),
                work_dir: root.join("work"),
                mode: InstallMode::Copy,
                files: vec![PathBuf::from("cinder/volume/drivers/quantastor.py")],
                marker_file: Some(root.join("marker")),
                fail_on_not_found,
            },
        }
    }

    fn assert_untouched(root: &Path) {
        assert!(!root.join("work").exists(), "work dir must not be created");
        assert!(!root.join("cinder").exists(), "target dir must not be created");
        assert!(!root.join("marker").exists(), "marker must not be written");
    }

    #[test]
    fn test_not_found_is_fatal_by_policy() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(StaticRefLister::new(Vec::new()));

        let err = installer.run(&config(dir.path(), true)).unwrap_err();
        assert!(
            matches!(
                err,
                InstallError::PatchsetNotFound { change, .. } if change == ChangeNumber::new(617_503)
            ),
            "{err:?}"
        );
        assert_untouched(dir.path());
    }

    #[test]
    fn test_not_found_skips_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(StaticRefLister::new(Vec::new()));

        let outcome = installer.run(&config(dir.path(), false)).unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::Skipped {
                change: ChangeNumber::new(617_503)
            }
        );
        assert_untouched(dir.path());
    }

    #[test]
    fn test_unreachable_remote_stops_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(StaticRefLister::unreachable("Connection refused"));

        for fail_on_not_found in [true, false] {
            let err = installer
                .run(&config(dir.path(), fail_on_not_found))
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    InstallError::Resolve(ResolveError::RemoteUnreachable { .. })
                ),
                "{err:?}"
            );
        }
        assert_untouched(dir.path());
    }

    #[test]
    fn test_malformed_listing_stops_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(StaticRefLister::new(vec![
            RemoteRef::new("a".repeat(40), "refs/changes/03/617503/1"),
            RemoteRef::new("b".repeat(40), "refs/changes/03/617503/meta"),
        ]));

        let err = installer.run(&config(dir.path(), false)).unwrap_err();
        assert!(
            matches!(err, InstallError::Resolve(ResolveError::MalformedRef { .. })),
            "{err:?}"
        );
        assert_untouched(dir.path());
    }

    #[test]
    fn test_resolve_uses_configured_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let lister = StaticRefLister::new(vec![RemoteRef::new(
            "c".repeat(40),
            "refs/review/03/617503/4",
        )]);
        let installer = Installer::new(&lister);
        let mut config = config(dir.path(), true);
        config.remote.namespace = "refs/review".to_string();

        let resolution = installer.resolve(&config).unwrap();
        assert_eq!(resolution.found().map(|p| p.patchset), Some(4));
        assert_eq!(
            lister.queries(),
            vec![(
                "https://review.example.org/openstack/cinder".to_string(),
                "refs/review/03/617503/*".to_string()
            )]
        );
    }

    #[test]
    fn test_pin_remote_makes_relative_path_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir_in(&cwd).unwrap();
        let relative = dir.path().strip_prefix(&cwd).unwrap().to_string_lossy();
        assert!(Path::new(&*relative).is_relative());

        let pinned = pin_remote(&relative);
        assert!(Path::new(&pinned).is_absolute(), "{pinned}");
        assert_eq!(
            std::fs::canonicalize(&pinned).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_pin_remote_keeps_urls_and_unknown_names() {
        for url in [
            "https://review.example.org/openstack/cinder",
            "ssh://ci@review.example.org:29418/openstack/cinder",
            "ci@review.example.org:openstack/cinder",
            "/no/such/local/project",
            "psfetch-no-such-remote-name",
        ] {
            assert_eq!(pin_remote(url), url);
        }
    }

    #[test]
    fn test_for_config_uses_configured_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::for_config(&config(dir.path(), true));
        assert_eq!(installer.lister.timeout(), std::time::Duration::from_secs(5));
    }
}
