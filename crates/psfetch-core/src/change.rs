//! Gerrit change numbers and patchset refs.
//!
//! Gerrit publishes every patchset of a change under
//! `refs/changes/<shard>/<change>/<patchset>`, where `<shard>` is the last two
//! digits of the change number, zero-padded. This module owns that naming
//! scheme and the validation of refs advertised by a remote.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::RemoteRef;

/// Ref namespace Gerrit uses for patchsets.
pub const DEFAULT_NAMESPACE: &str = "refs/changes";

/// A Gerrit change number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeNumber(u64);

impl ChangeNumber {
    /// Wraps a raw change number.
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// Returns the raw change number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the two-character shard: `change % 100`, zero-padded.
    ///
    /// ```
    /// use psfetch_core::change::ChangeNumber;
    ///
    /// assert_eq!(ChangeNumber::new(617_503).shard(), "03");
    /// assert_eq!(ChangeNumber::new(5).shard(), "05");
    /// ```
    #[must_use]
    pub fn shard(self) -> String {
        format!("{:02}", self.0 % 100)
    }

    /// Returns `<namespace>/<shard>/<change>`.
    #[must_use]
    pub fn ref_prefix(self, namespace: &str) -> String {
        format!("{namespace}/{}/{}", self.shard(), self.0)
    }

    /// Returns the glob handed to `git ls-remote`: `<prefix>/*`.
    #[must_use]
    pub fn ref_pattern(self, namespace: &str) -> String {
        format!("{}/*", self.ref_prefix(namespace))
    }
}

impl fmt::Display for ChangeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeNumber {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Why an advertised ref could not be read as a patchset of the change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefParseError {
    /// The ref is not directly below `<namespace>/<shard>/<change>/`.
    #[error("ref is not below {prefix}/")]
    OutsidePrefix {
        /// Expected prefix.
        prefix: String,
    },

    /// The trailing segment is not a decimal number.
    #[error("trailing segment {segment:?} is not a patchset number")]
    NotNumeric {
        /// The offending segment.
        segment: String,
    },

    /// Patchset numbers start at 1.
    #[error("patchset number must be positive")]
    Zero,

    /// The trailing segment does not fit a patchset number.
    #[error("trailing segment {segment:?} is out of range")]
    Overflow {
        /// The offending segment.
        segment: String,
    },
}

/// One patchset of a change, as advertised by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchsetRef {
    /// Full ref name, e.g. `refs/changes/03/617503/7`.
    pub name: String,
    /// Commit id the remote advertised for the ref.
    pub commit: String,
    /// Patchset number parsed from the trailing segment.
    pub patchset: u32,
}

impl PatchsetRef {
    /// Validates `remote_ref` as `<prefix>/<patchset>` and extracts the
    /// patchset number.
    ///
    /// # Errors
    ///
    /// Returns a [`RefParseError`] if the ref lies outside `prefix` or its
    /// trailing segment is not a positive decimal integer.
    pub fn parse(prefix: &str, remote_ref: &RemoteRef) -> Result<Self, RefParseError> {
        let segment = remote_ref
            .name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|segment| !segment.is_empty() && !segment.contains('/'))
            .ok_or_else(|| RefParseError::OutsidePrefix {
                prefix: prefix.to_string(),
            })?;

        let patchset = parse_patchset_number(segment)?;

        Ok(Self {
            name: remote_ref.name.clone(),
            commit: remote_ref.commit.clone(),
            patchset,
        })
    }

    /// Returns the first `len` characters of the commit id.
    #[must_use]
    pub fn short_commit(&self, len: usize) -> &str {
        let end = self
            .commit
            .char_indices()
            .nth(len)
            .map_or(self.commit.len(), |(idx, _)| idx);
        &self.commit[..end]
    }
}

impl fmt::Display for PatchsetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.commit)
    }
}

// `u32::from_str` accepts a leading '+', which Gerrit never emits.
fn parse_patchset_number(segment: &str) -> Result<u32, RefParseError> {
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RefParseError::NotNumeric {
            segment: segment.to_string(),
        });
    }

    let patchset: u32 = segment.parse().map_err(|_| RefParseError::Overflow {
        segment: segment.to_string(),
    })?;

    if patchset == 0 {
        return Err(RefParseError::Zero);
    }
    Ok(patchset)
}
