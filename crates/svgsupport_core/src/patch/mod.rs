//! Load-time source patching for host routines.
//!
//! # Responsibility
//! - Rewrite a host routine's source with ordered text rules.
//! - Hand the rewritten text to the host loader through a read-once
//!   in-memory slot so the host sees an ordinary load.
//! - Append tokens to host option lists as a best-effort override.
//!
//! # Invariants
//! - A target whose symbol the host already defines is never loaded again.
//! - One failing target never prevents the remaining targets from loading.
//! - A rule that matches nothing is logged, not raised.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod loader;
pub mod overrides;
pub mod rule;
pub mod slots;
pub mod target;

pub use loader::{InstallReport, ModuleHost, PatchLoader, SkipReason, TargetOutcome, TargetReport};
pub use overrides::{
    append_tokens, apply_overrides, media_option_overrides, ConfigStore, OptionOverride,
    OverrideOutcome, OverrideSkip,
};
pub use rule::{apply_rules, PatchRule, PatchedSource, RuleApplication};
pub use slots::{VirtualPath, VirtualSlots};
pub use target::{FailurePolicy, PatchTarget};

pub type PatchResult<T> = Result<T, PatchError>;

/// Install-time failures for one patch target.
#[derive(Debug)]
pub enum PatchError {
    /// The target's original source could not be read.
    SourceUnreadable {
        target: String,
        path: PathBuf,
        source: std::io::Error,
    },
    /// A slot key was written twice.
    SlotOccupied(String),
    /// The host asked for a slot that does not exist or was already read.
    SlotMissing(String),
    /// The host loader refused or failed to load the patched source.
    HostLoad { target: String, message: String },
    InvalidRule(String),
    InvalidTarget(String),
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnreadable {
                target,
                path,
                source,
            } => write!(
                f,
                "source of `{target}` is unreadable at `{}`: {source}",
                path.display()
            ),
            Self::SlotOccupied(key) => write!(f, "virtual slot already written: {key}"),
            Self::SlotMissing(key) => write!(f, "virtual slot not found: {key}"),
            Self::HostLoad { target, message } => {
                write!(f, "host failed to load patched `{target}`: {message}")
            }
            Self::InvalidRule(message) => write!(f, "invalid patch rule: {message}"),
            Self::InvalidTarget(message) => write!(f, "invalid patch target: {message}"),
        }
    }
}

impl Error for PatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SourceUnreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}
