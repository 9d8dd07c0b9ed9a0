//! Latest-patchset resolution.
//!
//! Given a change number, the resolver lists
//! `<namespace>/<shard>/<change>/*` on the remote, validates every returned
//! ref and picks the one with the highest patchset number. Comparison is
//! numeric: patchset 10 is newer than patchset 2.
//!
//! Every advertised ref must parse. A single malformed entry aborts the
//! resolution instead of being skipped, since ordering a listing that
//! contains garbage would be a guess.
//!
//! # Example
//!
//! ```rust
//! use psfetch_core::change::ChangeNumber;
//! use psfetch_core::remote::{RemoteRef, StaticRefLister};
//! use psfetch_core::resolver::{Resolution, resolve_latest_patchset};
//!
//! let sha = "a".repeat(40);
//! let lister = StaticRefLister::new(vec![
//!     RemoteRef::new(sha.clone(), "refs/changes/03/617503/2"),
//!     RemoteRef::new(sha.clone(), "refs/changes/03/617503/10"),
//!     RemoteRef::new(sha, "refs/changes/03/617503/1"),
//! ]);
//!
//! let resolution =
//!     resolve_latest_patchset(&lister, "origin", ChangeNumber::new(617_503)).unwrap();
//! let Resolution::Found(latest) = resolution else {
//!     panic!("expected a patchset");
//! };
//! assert_eq!(latest.name, "refs/changes/03/617503/10");
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use thiserror::Error;
use tracing::{debug, info};

use crate::change::{ChangeNumber, DEFAULT_NAMESPACE, PatchsetRef, RefParseError};
use crate::remote::{RefLister, RemoteError, RemoteRef};

/// Outcome of a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The patchset with the highest number.
    Found(PatchsetRef),
    /// The remote has no patchsets for the change.
    NotFound,
}

impl Resolution {
    /// Returns the resolved patchset, if any.
    #[must_use]
    pub const fn found(&self) -> Option<&PatchsetRef> {
        match self {
            Self::Found(patchset) => Some(patchset),
            Self::NotFound => None,
        }
    }

    /// Consumes the resolution, returning the resolved patchset, if any.
    #[must_use]
    pub fn into_found(self) -> Option<PatchsetRef> {
        match self {
            Self::Found(patchset) => Some(patchset),
            Self::NotFound => None,
        }
    }
}

/// Errors that abort a resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The remote could not be listed.
    #[error("could not list patchsets of change {change} on {remote}")]
    RemoteUnreachable {
        /// Remote that was queried.
        remote: String,
        /// Change whose refs were requested.
        change: ChangeNumber,
        /// Underlying listing failure.
        #[source]
        source: RemoteError,
    },

    /// An advertised ref is not a valid patchset ref of the change.
    #[error("malformed patchset ref {name:?}")]
    MalformedRef {
        /// The ref as advertised.
        name: String,
        /// Why it was rejected.
        #[source]
        reason: RefParseError,
    },

    /// Two advertised refs carry the same patchset number.
    #[error("patchset {patchset} advertised twice: {first:?} and {second:?}")]
    DuplicatePatchset {
        /// The repeated number.
        patchset: u32,
        /// First ref carrying it.
        first: String,
        /// Second ref carrying it.
        second: String,
    },
}

/// Resolves the latest patchset of a change.
#[derive(Debug, Clone)]
pub struct PatchsetResolver<L> {
    lister: L,
    namespace: String,
}

impl<L: RefLister> PatchsetResolver<L> {
    /// Creates a resolver over `lister` using [`DEFAULT_NAMESPACE`].
    #[must_use]
    pub fn new(lister: L) -> Self {
        Self {
            lister,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Overrides the ref namespace (no trailing slash).
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Returns the ref namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Queries `remote` once and selects the latest patchset of `change`.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::RemoteUnreachable`] if the listing fails
    /// - [`ResolveError::MalformedRef`] if any returned ref does not parse
    /// - [`ResolveError::DuplicatePatchset`] if a patchset number repeats
    pub fn resolve(&self, remote: &str, change: ChangeNumber) -> Result<Resolution, ResolveError> {
        let prefix = change.ref_prefix(&self.namespace);
        let pattern = change.ref_pattern(&self.namespace);

        let refs = self.lister.list_refs(remote, &pattern).map_err(|source| {
            ResolveError::RemoteUnreachable {
                remote: remote.to_string(),
                change,
                source,
            }
        })?;
        debug!(%change, count = refs.len(), "remote returned patchset refs");

        let resolution = match select_latest(&prefix, &refs)? {
            Some(latest) => {
                info!(
                    %change,
                    patchset = latest.patchset,
                    ref_name = %latest.name,
                    commit = %latest.commit,
                    "resolved latest patchset"
                );
                Resolution::Found(latest)
            },
            None => {
                info!(%change, remote, "no patchsets found");
                Resolution::NotFound
            },
        };
        Ok(resolution)
    }
}

/// Resolves the latest patchset of `change` on `remote` under the default
/// namespace.
///
/// # Errors
///
/// See [`PatchsetResolver::resolve`].
pub fn resolve_latest_patchset<L: RefLister + ?Sized>(
    lister: &L,
    remote: &str,
    change: ChangeNumber,
) -> Result<Resolution, ResolveError> {
    PatchsetResolver::new(lister).resolve(remote, change)
}

/// Validates every ref in `refs` against `prefix` and returns the one with
/// the highest patchset number, or `None` for an empty listing.
///
/// The result does not depend on the order of `refs`.
///
/// # Errors
///
/// Returns [`ResolveError::MalformedRef`] or
/// [`ResolveError::DuplicatePatchset`]; no partial result is produced.
pub fn select_latest(
    prefix: &str,
    refs: &[RemoteRef],
) -> Result<Option<PatchsetRef>, ResolveError> {
    let mut by_number: BTreeMap<u32, PatchsetRef> = BTreeMap::new();

    for remote_ref in refs {
        let parsed =
            PatchsetRef::parse(prefix, remote_ref).map_err(|reason| ResolveError::MalformedRef {
                name: remote_ref.name.clone(),
                reason,
            })?;

        match by_number.entry(parsed.patchset) {
            Entry::Vacant(slot) => {
                slot.insert(parsed);
            },
            Entry::Occupied(existing) => {
                let (first, second) = if existing.get().name <= parsed.name {
                    (existing.get().name.clone(), parsed.name)
                } else {
                    (parsed.name, existing.get().name.clone())
                };
                return Err(ResolveError::DuplicatePatchset {
                    patchset: parsed.patchset,
                    first,
                    second,
                });
            },
        }
    }

    Ok(by_number.pop_last().map(|(_, latest)| latest))
}
