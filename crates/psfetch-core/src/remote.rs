//! Remote ref listing.
//!
//! The resolver only needs one capability from a remote: "list the refs that
//! match this pattern". That capability sits behind [`RefLister`] so the
//! resolver can be exercised without a network.
//!
//! # Implementations
//!
//! ```text
//! RefLister (trait)
//!     |
//!     +-- GitLsRemote      runs `git ls-remote` under a timeout
//!     |
//!     +-- StaticRefLister  fixed listing, for tests and dry runs
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use xshell::{Shell, cmd};

/// Default upper bound on a single `git ls-remote` call.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(120);

/// Exit status `timeout(1)` reports when it had to stop the command.
const TIMEOUT_EXIT_STATUS: i32 = 124;

/// Commit ids as printed by `git ls-remote` (SHA-1 or SHA-256, lowercase).
static COMMIT_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{40}$|^[0-9a-f]{64}$").expect("Invalid regex pattern for commit id")
});

/// A ref advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Commit id the ref points to.
    pub commit: String,
    /// Full ref name.
    pub name: String,
}

impl RemoteRef {
    /// Creates a ref entry.
    #[must_use]
    pub fn new(commit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            name: name.into(),
        }
    }
}

/// Errors produced while listing a remote.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The listing command could not be started.
    #[error("failed to run git ls-remote: {0}")]
    Shell(#[from] xshell::Error),

    /// The listing command did not finish in time.
    #[error("git ls-remote timed out after {secs}s")]
    TimedOut {
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The listing command exited unsuccessfully.
    #[error("git ls-remote exited with {}: {stderr}", describe_status(.status))]
    CommandFailed {
        /// Exit status, `None` when killed by a signal.
        status: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The listing output could not be parsed.
    #[error("unexpected git ls-remote output on line {line_no}: {reason}")]
    Parse {
        /// 1-based line number.
        line_no: usize,
        /// What was wrong with the line.
        reason: String,
    },
}

#[allow(clippy::ref_option)]
fn describe_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "a signal".to_string(), |code| format!("status {code}"))
}

/// Lists refs of a remote matching a pattern.
pub trait RefLister {
    /// Returns every ref of `remote` matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the remote could not be queried or its
    /// answer could not be read.
    fn list_refs(&self, remote: &str, pattern: &str) -> Result<Vec<RemoteRef>, RemoteError>;
}

impl<T: RefLister + ?Sized> RefLister for &T {
    fn list_refs(&self, remote: &str, pattern: &str) -> Result<Vec<RemoteRef>, RemoteError> {
        (**self).list_refs(remote, pattern)
    }
}

// =============================================================================
// git ls-remote
// =============================================================================

/// [`RefLister`] backed by `git ls-remote`.
///
/// The call is wrapped in `timeout(1)` unless the timeout is zero, and runs
/// with `GIT_TERMINAL_PROMPT=0` so a remote asking for credentials fails
/// instead of blocking on a terminal prompt.
#[derive(Debug, Clone)]
pub struct GitLsRemote {
    timeout: Duration,
}

impl GitLsRemote {
    /// Creates a lister with [`DEFAULT_LIST_TIMEOUT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    /// Sets the timeout. Zero disables it.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for GitLsRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RefLister for GitLsRemote {
    fn list_refs(&self, remote: &str, pattern: &str) -> Result<Vec<RemoteRef>, RemoteError> {
        let sh = Shell::new()?;
        let secs = self.timeout.as_secs();

        debug!(remote, pattern, timeout_secs = secs, "listing remote refs");

        let command = if secs == 0 {
            cmd!(sh, "git ls-remote {remote} {pattern}")
        } else {
            let secs_arg = secs.to_string();
            cmd!(sh, "timeout {secs_arg} git ls-remote {remote} {pattern}")
        };

        let output = command
            .env("GIT_TERMINAL_PROMPT", "0")
            .quiet()
            .ignore_status()
            .output()?;

        if !output.status.success() {
            let status = output.status.code();
            if secs != 0 && status == Some(TIMEOUT_EXIT_STATUS) {
                return Err(RemoteError::TimedOut { secs });
            }
            return Err(RemoteError::CommandFailed {
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_ls_remote(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses `git ls-remote` output: one `<commit>\t<ref>` entry per line.
///
/// Blank lines are ignored.
///
/// # Errors
///
/// Returns [`RemoteError::Parse`] for a line without a tab separator, with an
/// empty ref name, or whose commit id is not a full hexadecimal object id.
pub fn parse_ls_remote(output: &str) -> Result<Vec<RemoteRef>, RemoteError> {
    let mut refs = Vec::new();

    for (idx, line) in output.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let Some((commit, name)) = line.split_once('\t') else {
            return Err(RemoteError::Parse {
                line_no,
                reason: format!("missing tab separator in {line:?}"),
            });
        };

        if !COMMIT_ID_REGEX.is_match(commit) {
            return Err(RemoteError::Parse {
                line_no,
                reason: format!("{commit:?} is not a commit id"),
            });
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(RemoteError::Parse {
                line_no,
                reason: "empty ref name".to_string(),
            });
        }

        refs.push(RemoteRef::new(commit, name));
    }

    Ok(refs)
}

// =============================================================================
// Static lister
// =============================================================================

/// [`RefLister`] answering every query with a fixed listing.
///
/// The listing is returned verbatim regardless of the pattern, which lets
/// tests feed refs a real remote would never return. Queries are recorded.
#[derive(Debug, Default)]
pub struct StaticRefLister {
    refs: Vec<RemoteRef>,
    failure: Option<String>,
    queries: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

impl StaticRefLister {
    /// Creates a lister that always returns `refs`.
    #[must_use]
    pub fn new(refs: Vec<RemoteRef>) -> Self {
        Self {
            refs,
            ..Self::default()
        }
    }

    /// Creates a lister whose queries always fail as an unreachable remote
    /// would, with `message` as the captured stderr.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of queries answered so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(remote, pattern)` pairs queried so far, oldest first.
    #[must_use]
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RefLister for StaticRefLister {
    fn list_refs(&self, remote: &str, pattern: &str) -> Result<Vec<RemoteRef>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((remote.to_string(), pattern.to_string()));

        match &self.failure {
            Some(message) => Err(RemoteError::CommandFailed {
                status: Some(128),
                stderr: message.clone(),
            }),
            None => Ok(self.refs.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "1111111111111111111111111111111111111111";
    const SHA_B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn test_parse_ls_remote_entries() {
        let output = format!(
            "{SHA_A}\trefs/changes/03/617503/1\n{SHA_B}\trefs/changes/03/617503/2\n"
        );
        let refs = parse_ls_remote(&output).unwrap();
        assert_eq!(
            refs,
            vec![
                RemoteRef::new(SHA_A, "refs/changes/03/617503/1"),
                RemoteRef::new(SHA_B, "refs/changes/03/617503/2"),
            ]
        );
    }

    #[test]
    fn test_parse_ls_remote_empty_output() {
        assert!(parse_ls_remote("").unwrap().is_empty());
        assert!(parse_ls_remote("\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ls_remote_tolerates_crlf_and_blank_lines() {
        let output = format!("\n{SHA_A}\trefs/changes/05/5/1\r\n\n");
        let refs = parse_ls_remote(&output).unwrap();
        assert_eq!(refs, vec![RemoteRef::new(SHA_A, "refs/changes/05/5/1")]);
    }

    #[test]
    fn test_parse_ls_remote_missing_tab() {
        let output = format!("{SHA_A}\trefs/changes/05/5/1\n{SHA_B} refs/changes/05/5/2\n");
        let err = parse_ls_remote(&output).unwrap_err();
        assert!(matches!(err, RemoteError::Parse { line_no: 2, .. }), "{err}");
    }

    #[test]
    fn test_parse_ls_remote_bad_commit() {
        let err = parse_ls_remote("not-a-sha\trefs/changes/05/5/1").unwrap_err();
        assert!(matches!(err, RemoteError::Parse { line_no: 1, .. }));

        let upper = SHA_A.replace('1', "A");
        assert!(parse_ls_remote(&format!("{upper}\trefs/changes/05/5/1")).is_err());
    }

    #[test]
    fn test_parse_ls_remote_empty_name() {
        let err = parse_ls_remote(&format!("{SHA_A}\t  ")).unwrap_err();
        assert!(matches!(err, RemoteError::Parse { line_no: 1, .. }));
    }

    #[test]
    fn test_static_lister_records_queries() {
        let lister = StaticRefLister::new(vec![RemoteRef::new(SHA_A, "refs/changes/05/5/1")]);
        let refs = lister.list_refs("origin", "refs/changes/05/5/*").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(lister.calls(), 1);
        assert_eq!(
            lister.queries(),
            vec![("origin".to_string(), "refs/changes/05/5/*".to_string())]
        );
    }

    #[test]
    fn test_static_lister_unreachable() {
        let lister = StaticRefLister::unreachable("Could not resolve host");
        let err = lister.list_refs("origin", "refs/changes/05/5/*").unwrap_err();
        assert!(err.to_string().contains("Could not resolve host"));
        assert!(err.to_string().contains("status 128"));
    }

    #[test]
    fn test_git_ls_remote_timeout_builder() {
        assert_eq!(GitLsRemote::new().timeout(), DEFAULT_LIST_TIMEOUT);
        let lister = GitLsRemote::new().with_timeout(Duration::from_secs(5));
        assert_eq!(lister.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_git_ls_remote_missing_remote_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let missing = missing.to_string_lossy();
        let result = GitLsRemote::new()
            .with_timeout(Duration::from_secs(10))
            .list_refs(&missing, "refs/changes/05/5/*");
        assert!(result.is_err(), "listing a missing repository must fail");
    }
}
