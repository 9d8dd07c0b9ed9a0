//! DevStack lifecycle gate.
//!
//! DevStack calls a plugin as `plugin.sh <mode> [<phase>]` many times during
//! a run. The driver install only belongs to `stack install`; every other
//! invocation is a no-op. Words DevStack may add later are accepted and
//! treated as "not ours".

use std::fmt;

/// First positional argument DevStack passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// `stack`
    Stack,
    /// `unstack`
    Unstack,
    /// `clean`
    Clean,
    /// `source`
    Source,
    /// Anything else.
    Other(String),
}

impl Mode {
    /// Maps a positional argument to a mode.
    #[must_use]
    pub fn parse(word: &str) -> Self {
        match word {
            "stack" => Self::Stack,
            "unstack" => Self::Unstack,
            "clean" => Self::Clean,
            "source" => Self::Source,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Second positional argument DevStack passes during `stack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// `pre-install`
    PreInstall,
    /// `install`
    Install,
    /// `post-config`
    PostConfig,
    /// `extra`
    Extra,
    /// `test-config`
    TestConfig,
    /// Anything else.
    Other(String),
}

impl Phase {
    /// Maps a positional argument to a phase.
    #[must_use]
    pub fn parse(word: &str) -> Self {
        match word {
            "pre-install" => Self::PreInstall,
            "install" => Self::Install,
            "post-config" => Self::PostConfig,
            "extra" => Self::Extra,
            "test-config" => Self::TestConfig,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What the plugin should do for an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDecision {
    /// Fetch and install the driver.
    Install,
    /// Nothing to do.
    Skip,
}

impl fmt::Display for PhaseDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Decides whether the `(mode, phase)` pair DevStack passed calls for an
/// install.
#[must_use]
pub fn decide(mode: &str, phase: Option<&str>) -> PhaseDecision {
    match (Mode::parse(mode), phase.map(Phase::parse)) {
        (Mode::Stack, Some(Phase::Install)) => PhaseDecision::Install,
        _ => PhaseDecision::Skip,
    }
}
